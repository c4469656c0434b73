/// Operating system used to produce an archive entry, as recorded in the
/// upper byte of the central directory's version-made-by field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum System {
    /// MS-DOS and OS/2
    Dos,
    /// UNIX
    Unix,
    /// Windows NTFS
    Ntfs,
    /// OS X (Darwin)
    Osx,
    /// Any other producer code; kept verbatim so entries round-trip.
    Unknown(u8),
}

impl System {
    /// Decodes the upper byte of a version-made-by field.
    pub fn from_u8(system: u8) -> System {
        use self::System::*;

        match system {
            0 => Dos,
            3 => Unix,
            10 => Ntfs,
            19 => Osx,
            v => Unknown(v),
        }
    }

    /// The code recorded in archive headers.
    pub fn to_u8(self) -> u8 {
        use self::System::*;

        match self {
            Dos => 0,
            Unix => 3,
            Ntfs => 10,
            Osx => 19,
            Unknown(v) => v,
        }
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn system() {
        use super::System;
        assert_eq!(System::Dos.to_u8(), 0);
        assert_eq!(System::Unix.to_u8(), 3);
        assert_eq!(System::Ntfs.to_u8(), 10);
        assert_eq!(System::Osx.to_u8(), 19);
        assert_eq!(System::from_u8(0), System::Dos);
        assert_eq!(System::from_u8(3), System::Unix);
        assert_eq!(System::from_u8(10), System::Ntfs);
        assert_eq!(System::from_u8(19), System::Osx);
        assert_eq!(System::from_u8(7), System::Unknown(7));
        assert_eq!(System::Unknown(7).to_u8(), 7);
    }
}
