pub use query_client::QueryClient;

mod query_client;
