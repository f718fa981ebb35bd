use crate::cc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerKind {
    /// Hashed archive index (`.bhd5`), paired with a data blob.
    Bhd5,
    /// Named archive index (`.*bhd`), paired with a data blob.
    Bhf3,
    /// Data blob half of either paired archive (`.bdt`, `.*bdt`).
    Bdf3,
    /// Single-file binder with inline payloads (`.*bnd`).
    Bnd3,
    /// DEFLATE wrapper (`.dcx`).
    Dcx,
}

const BHD5: u32 = cc::make_four(b"BHD5");
const BHF3: u32 = cc::make_four(b"BHF3");
const BDF3: u32 = cc::make_four(b"BDF3");
const BND3: u32 = cc::make_four(b"BND3");
const DCX: u32 = cc::make_four(b"DCX\0");

#[must_use]
pub fn guess_format(bytes: &[u8]) -> Option<ContainerKind> {
    let magic: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    match u32::from_le_bytes(magic) {
        BHD5 => Some(ContainerKind::Bhd5),
        BHF3 => Some(ContainerKind::Bhf3),
        BDF3 => Some(ContainerKind::Bdf3),
        BND3 => Some(ContainerKind::Bnd3),
        DCX => Some(ContainerKind::Dcx),
        _ => None,
    }
}

#[must_use]
pub fn appears_bhd5(bytes: &[u8]) -> bool {
    guess_format(bytes) == Some(ContainerKind::Bhd5)
}

#[must_use]
pub fn appears_bhf3(bytes: &[u8]) -> bool {
    guess_format(bytes) == Some(ContainerKind::Bhf3)
}

#[must_use]
pub fn appears_bdf3(bytes: &[u8]) -> bool {
    guess_format(bytes) == Some(ContainerKind::Bdf3)
}

#[must_use]
pub fn appears_bnd3(bytes: &[u8]) -> bool {
    guess_format(bytes) == Some(ContainerKind::Bnd3)
}

#[must_use]
pub fn appears_dcx(bytes: &[u8]) -> bool {
    guess_format(bytes) == Some(ContainerKind::Dcx)
}

#[cfg(test)]
mod tests {
    use super::ContainerKind;

    #[test]
    fn guess() {
        let tests: &[(ContainerKind, &[u8])] = &[
            (ContainerKind::Bhd5, b"BHD5\xFF\x00\x00\x00"),
            (ContainerKind::Bhf3, b"BHF307D7R6\x00\x00"),
            (ContainerKind::Bdf3, b"BDF307D7R6\x00\x00"),
            (ContainerKind::Bnd3, b"BND307D7R6\x00\x00"),
            (ContainerKind::Dcx, b"DCX\x00\x00\x01\x00\x00"),
        ];

        for (kind, bytes) in tests {
            assert_eq!(crate::guess_format(bytes), Some(*kind));
        }
    }

    #[test]
    fn detection_is_exclusive() {
        let fixtures: &[&[u8]] = &[
            b"BHD5\xFF\x00\x00\x00",
            b"BHF307D7R6\x00\x00",
            b"BDF307D7R6\x00\x00",
            b"BND307D7R6\x00\x00",
            b"DCX\x00\x00\x01\x00\x00",
        ];

        for bytes in fixtures {
            let hits = [
                crate::appears_bhd5(bytes),
                crate::appears_bhf3(bytes),
                crate::appears_bdf3(bytes),
                crate::appears_bnd3(bytes),
                crate::appears_dcx(bytes),
            ]
            .iter()
            .filter(|&&hit| hit)
            .count();
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn too_short_or_unknown_is_none() {
        assert_eq!(crate::guess_format(b""), None);
        assert_eq!(crate::guess_format(b"BN"), None);
        assert_eq!(crate::guess_format(b"BSA\x00garbage"), None);
    }
}
