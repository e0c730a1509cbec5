//! Legacy XOR password verifier used by PASSWORD, FILESHARING and sheet
//! protection.

/// 16-bit verifier of `password` (ASCII bytes of the first 15 characters).
pub fn xor_verifier(password: &str) -> u16 {
    let bytes: Vec<u8> = password.chars().take(15).map(|c| c as u32 as u8).collect();
    let mut hash: u16 = 0;
    for &b in bytes.iter().rev() {
        hash = ((hash >> 14) & 0x01) | ((hash << 1) & 0x7FFF);
        hash ^= b as u16;
    }
    hash = ((hash >> 14) & 0x01) | ((hash << 1) & 0x7FFF);
    hash ^= bytes.len() as u16;
    hash ^ 0xCE4B
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_verifiers() {
        assert_eq!(xor_verifier(""), 0xCE4B);
        assert_eq!(xor_verifier("a"), 0xCE88);
    }
}
