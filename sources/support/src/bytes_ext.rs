use anyhow::{anyhow, Result};
use bytes::Buf;
use paste::paste;

macro_rules! try_get {
    ($($ty:ty),*) => {
        paste! {
            $(
                fn [<try_get_ $ty>](&mut self) -> Result<$ty> {
                    if self.remaining() < std::mem::size_of::<$ty>() {
                        return Err(anyhow!(
                            "eof: needed {} bytes for {}, had {}",
                            std::mem::size_of::<$ty>(),
                            stringify!($ty),
                            self.remaining()
                        ));
                    }

                    Ok(self.[<get_ $ty>]())
                }
            )*
        }
    };
}

macro_rules! try_get_le {
    ($($ty:ty),*) => {
        paste! {
            $(
                fn [<try_get_ $ty _le>](&mut self) -> Result<$ty> {
                    if self.remaining() < std::mem::size_of::<$ty>() {
                        return Err(anyhow!(
                            "eof: needed {} bytes for {}, had {}",
                            std::mem::size_of::<$ty>(),
                            stringify!($ty),
                            self.remaining()
                        ));
                    }

                    Ok(self.[<get_ $ty _le>]())
                }
            )*
        }
    };
}

/// Checked reads on top of [`Buf`], so that truncated byte streams surface as
/// errors instead of panics.
pub trait SafeBuf: Buf {
    try_get!(u8, i8);
    try_get_le!(u16, i16, u32, i32, u64, i64);
}

impl<T: Buf> SafeBuf for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn reads_in_little_endian_order() {
        let mut buf = Bytes::from_static(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(SafeBuf::try_get_u32_le(&mut buf).unwrap(), 0x0403_0201);
    }

    #[test]
    fn errors_instead_of_panicking_at_eof() {
        let mut buf = Bytes::from_static(&[0x01]);
        assert!(SafeBuf::try_get_u16_le(&mut buf).is_err());
    }
}
