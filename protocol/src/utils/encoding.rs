use encoding::{all::ISO_8859_1, DecoderTrap, Encoding};

/// Decodes raw packet bytes the way the vanilla query listener emits them:
/// one byte per character, no multi-byte sequences.
pub fn decode_latin1(bytes: &[u8]) -> String {
    ISO_8859_1
        .decode(bytes, DecoderTrap::Ignore)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_latin1_test() {
        assert_eq!(decode_latin1(b"A Minecraft Server"), "A Minecraft Server");
        // 0xA7 is the section sign used by legacy motd color codes
        assert_eq!(decode_latin1(&[0xA7, b'c']), "\u{a7}c");
    }

    #[test]
    fn decode_latin1_keeps_nul_bytes() {
        assert_eq!(decode_latin1(b"a\0b"), "a\0b");
    }
}
