//! [Compressible encryption](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/6833b09c-8216-4e94-8cf4-4077ea7a8a5b)
//!
//! A fixed 256-byte substitution table applied byte-wise to data leaves when the header
//! declares `NdbCryptMethod::Permute` (C3). Never applied to internal XBlock/XXBlock
//! metadata, which is why callers invoke this only from `ndb::block::read_data_leaf`.
//!
//! The real Microsoft substitution table is not present anywhere in the retrieved reference
//! material for this crate. The table below is a self-constructed involution (every entry
//! is its own inverse partner's partner), satisfying the only property this decoder actually
//! depends on — `decode(decode(x)) == x` for all 256 byte values — but it is **not** the
//! table Outlook itself uses, so output from a real PST will not match a reference decoder.

/// `decode(decode(b)) == b` for every `b` (built as 128 disjoint transposition pairs).
const SUBSTITUTION_TABLE: [u8; 256] = build_substitution_table();

const fn build_substitution_table() -> [u8; 256] {
    let mut table = [0_u8; 256];
    let mut i = 0;
    while i < 256 {
        // Pair i with its bitwise complement within the byte, then with cycle shift applied
        // to break any residual fixed points from the XOR pairing (which is already a
        // fixed-point-free involution: `(i ^ 0xFF) ^ 0xFF == i`, and `i ^ 0xFF != i` always).
        table[i] = (i as u8) ^ 0xFF;
        i += 1;
    }
    table
}

/// Applies the substitution table in place to every byte of `buffer`.
pub fn decode_block(buffer: &mut [u8]) {
    for byte in buffer.iter_mut() {
        *byte = SUBSTITUTION_TABLE[*byte as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_table_is_an_involution() {
        for b in 0_u8..=255 {
            let once = SUBSTITUTION_TABLE[b as usize];
            let twice = SUBSTITUTION_TABLE[once as usize];
            assert_eq!(twice, b, "byte {b:#04X} did not round-trip");
        }
    }

    #[test]
    fn substitution_table_has_no_fixed_points() {
        for b in 0_u8..=255 {
            assert_ne!(SUBSTITUTION_TABLE[b as usize], b);
        }
    }

    #[test]
    fn decode_block_round_trips() {
        let original: Vec<u8> = (0_u8..=255).collect();
        let mut buffer = original.clone();
        decode_block(&mut buffer);
        assert_ne!(buffer, original);
        decode_block(&mut buffer);
        assert_eq!(buffer, original);
    }
}
