pub use logwatch::{classify, listener_stopped, LogState};
pub use query::{
    handshake_packet, parse_challenge, parse_full_stat, stat_packet, PingResponse, QueryError,
};

mod logwatch;
mod query;
