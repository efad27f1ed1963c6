//! Pixel format codes, output encodings and bit-depth unpacking.
//!
//! Pixel formats use GenICam PFNC codes. Bits 16-23 of a code hold the
//! number of bits a pixel occupies in memory.

use std::fmt;

/// GenICam PFNC pixel format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat(pub u32);

macro_rules! pixel_formats {
    ($($ident:ident = $code:literal, $name:literal;)*) => {
        impl PixelFormat {
            $(
                #[doc = concat!("`", $name, "`")]
                pub const $ident: Self = Self($code);
            )*

            /// Every format this crate knows by name.
            pub const ALL: &'static [Self] = &[$(Self::$ident),*];

            /// PFNC option name, e.g. `"Mono8"`.
            #[must_use]
            pub const fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($code => Some($name),)*
                    _ => None,
                }
            }

            /// Look a format up by its PFNC option name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$ident),)*
                    _ => None,
                }
            }
        }
    };
}

pixel_formats! {
    MONO8 = 0x0108_0001, "Mono8";
    MONO10 = 0x0110_0003, "Mono10";
    MONO12 = 0x0110_0005, "Mono12";
    MONO14 = 0x0110_0025, "Mono14";
    MONO16 = 0x0110_0007, "Mono16";
    BAYER_GR8 = 0x0108_0008, "BayerGR8";
    BAYER_RG8 = 0x0108_0009, "BayerRG8";
    BAYER_GB8 = 0x0108_000A, "BayerGB8";
    BAYER_BG8 = 0x0108_000B, "BayerBG8";
    BAYER_GR10 = 0x0110_000C, "BayerGR10";
    BAYER_RG10 = 0x0110_000D, "BayerRG10";
    BAYER_GB10 = 0x0110_000E, "BayerGB10";
    BAYER_BG10 = 0x0110_000F, "BayerBG10";
    BAYER_GR12 = 0x0110_0010, "BayerGR12";
    BAYER_RG12 = 0x0110_0011, "BayerRG12";
    BAYER_GB12 = 0x0110_0012, "BayerGB12";
    BAYER_BG12 = 0x0110_0013, "BayerBG12";
    BAYER_GR16 = 0x0110_002E, "BayerGR16";
    BAYER_RG16 = 0x0110_002F, "BayerRG16";
    BAYER_GB16 = 0x0110_0030, "BayerGB16";
    BAYER_BG16 = 0x0110_0031, "BayerBG16";
    RGB8 = 0x0218_0014, "RGB8";
    BGR8 = 0x0218_0015, "BGR8";
    RGB16 = 0x0230_0033, "RGB16";
    BGR16 = 0x0230_004B, "BGR16";
    RGBA8 = 0x0220_0016, "RGBa8";
    BGRA8 = 0x0220_0017, "BGRa8";
    RGBA16 = 0x0240_0064, "RGBa16";
    BGRA16 = 0x0240_004C, "BGRa16";
    YUV422_PACKED = 0x0210_001F, "YUV422Packed";
    YUV422_8 = 0x0210_0032, "YUV422_8";
    YCBCR422_8 = 0x0210_003B, "YCbCr422_8";
    YCBCR601_422_8 = 0x0210_003E, "YCbCr601_422_8";
    YCBCR709_422_8 = 0x0210_0041, "YCbCr709_422_8";
    YCBCR422_8_CBYCRY = 0x0210_0043, "YCbCr422_8_CbYCrY";
    YCBCR601_422_8_CBYCRY = 0x0210_0044, "YCbCr601_422_8_CbYCrY";
    YCBCR709_422_8_CBYCRY = 0x0210_0045, "YCbCr709_422_8_CbYCrY";
}

impl PixelFormat {
    /// Bits a single pixel occupies in memory.
    #[must_use]
    pub const fn bits_per_pixel(self) -> u32 {
        (self.0 >> 16) & 0xFF
    }

    /// Output encoding for images delivered in this format.
    #[must_use]
    pub const fn encoding(self) -> Encoding {
        match self {
            Self::MONO8 => Encoding::Mono8,
            Self::MONO10 | Self::MONO12 | Self::MONO14 | Self::MONO16 => Encoding::Mono16,
            Self::BAYER_GR8 => Encoding::BayerGrbg8,
            Self::BAYER_RG8 => Encoding::BayerRggb8,
            Self::BAYER_GB8 => Encoding::BayerGbrg8,
            Self::BAYER_BG8 => Encoding::BayerBggr8,
            Self::BAYER_GR10 | Self::BAYER_GR12 | Self::BAYER_GR16 => Encoding::BayerGrbg16,
            Self::BAYER_RG10 | Self::BAYER_RG12 | Self::BAYER_RG16 => Encoding::BayerRggb16,
            Self::BAYER_GB10 | Self::BAYER_GB12 | Self::BAYER_GB16 => Encoding::BayerGbrg16,
            Self::BAYER_BG10 | Self::BAYER_BG12 | Self::BAYER_BG16 => Encoding::BayerBggr16,
            Self::RGB8 => Encoding::Rgb8,
            Self::BGR8 => Encoding::Bgr8,
            Self::RGB16 => Encoding::Rgb16,
            Self::BGR16 => Encoding::Bgr16,
            Self::RGBA8 => Encoding::Rgba8,
            Self::BGRA8 => Encoding::Bgra8,
            Self::RGBA16 => Encoding::Rgba16,
            Self::BGRA16 => Encoding::Bgra16,
            Self::YUV422_PACKED | Self::YCBCR422_8_CBYCRY => Encoding::Yuv422,
            Self::YUV422_8
            | Self::YCBCR422_8
            | Self::YCBCR601_422_8
            | Self::YCBCR709_422_8
            | Self::YCBCR601_422_8_CBYCRY
            | Self::YCBCR709_422_8_CBYCRY => Encoding::Yuv422Yuy2,
            _ => Encoding::Type8Uc1,
        }
    }

    /// Left shift that moves the significant bits of a 16-bit container to
    /// the top, or `None` when samples are stored as-is.
    #[must_use]
    pub const fn msb_shift(self) -> Option<u32> {
        match self {
            Self::MONO10 | Self::BAYER_GR10 | Self::BAYER_RG10 | Self::BAYER_GB10
            | Self::BAYER_BG10 => Some(6),
            Self::MONO12 | Self::BAYER_GR12 | Self::BAYER_RG12 | Self::BAYER_GB12
            | Self::BAYER_BG12 => Some(4),
            Self::MONO14 => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

/// Image encoding tag attached to delivered frames.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    Mono8,
    Mono16,
    BayerRggb8,
    BayerBggr8,
    BayerGbrg8,
    BayerGrbg8,
    BayerRggb16,
    BayerBggr16,
    BayerGbrg16,
    BayerGrbg16,
    Rgb8,
    Bgr8,
    Rgb16,
    Bgr16,
    Rgba8,
    Bgra8,
    Rgba16,
    Bgra16,
    /// UYVY ordering.
    Yuv422,
    /// YUYV ordering.
    Yuv422Yuy2,
    /// Untyped 8-bit single channel; fallback for unknown formats.
    #[default]
    Type8Uc1,
}

impl Encoding {
    /// Conventional encoding string, e.g. `"bayer_rggb16"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mono8 => "mono8",
            Self::Mono16 => "mono16",
            Self::BayerRggb8 => "bayer_rggb8",
            Self::BayerBggr8 => "bayer_bggr8",
            Self::BayerGbrg8 => "bayer_gbrg8",
            Self::BayerGrbg8 => "bayer_grbg8",
            Self::BayerRggb16 => "bayer_rggb16",
            Self::BayerBggr16 => "bayer_bggr16",
            Self::BayerGbrg16 => "bayer_gbrg16",
            Self::BayerGrbg16 => "bayer_grbg16",
            Self::Rgb8 => "rgb8",
            Self::Bgr8 => "bgr8",
            Self::Rgb16 => "rgb16",
            Self::Bgr16 => "bgr16",
            Self::Rgba8 => "rgba8",
            Self::Bgra8 => "bgra8",
            Self::Rgba16 => "rgba16",
            Self::Bgra16 => "bgra16",
            Self::Yuv422 => "yuv422",
            Self::Yuv422Yuy2 => "yuv422_yuy2",
            Self::Type8Uc1 => "8UC1",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy little-endian 16-bit samples from `src` to `dst`, shifting each
/// left by `shift` bits. Stops at the shorter of the two slices.
pub fn left_shift16(dst: &mut [u8], src: &[u8], shift: u32) {
    for (out, sample) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        if let Ok(bytes) = <[u8; 2]>::try_from(sample) {
            out.copy_from_slice(&(u16::from_le_bytes(bytes) << shift).to_le_bytes());
        }
    }
}

/// In-place variant of [`left_shift16`].
pub fn left_shift16_in_place(buf: &mut [u8], shift: u32) {
    for sample in buf.chunks_exact_mut(2) {
        if let Ok(bytes) = <[u8; 2]>::try_from(&*sample) {
            sample.copy_from_slice(&(u16::from_le_bytes(bytes) << shift).to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_bits_per_pixel_from_code() {
        assert_eq!(PixelFormat::MONO8.bits_per_pixel(), 8);
        assert_eq!(PixelFormat::MONO10.bits_per_pixel(), 16);
        assert_eq!(PixelFormat::RGB8.bits_per_pixel(), 24);
        assert_eq!(PixelFormat::BGRA16.bits_per_pixel(), 64);
        assert_eq!(PixelFormat::YUV422_8.bits_per_pixel(), 16);
    }

    #[test]
    fn test_shift_amounts() {
        for format in [
            PixelFormat::MONO10,
            PixelFormat::BAYER_GR10,
            PixelFormat::BAYER_RG10,
            PixelFormat::BAYER_GB10,
            PixelFormat::BAYER_BG10,
        ] {
            assert_eq!(format.msb_shift(), Some(6), "{format}");
        }
        for format in [
            PixelFormat::MONO12,
            PixelFormat::BAYER_GR12,
            PixelFormat::BAYER_RG12,
            PixelFormat::BAYER_GB12,
            PixelFormat::BAYER_BG12,
        ] {
            assert_eq!(format.msb_shift(), Some(4), "{format}");
        }
        assert_eq!(PixelFormat::MONO14.msb_shift(), Some(2));
        assert_eq!(PixelFormat::MONO16.msb_shift(), None);
        assert_eq!(PixelFormat::BAYER_RG16.msb_shift(), None);
        assert_eq!(PixelFormat::MONO8.msb_shift(), None);
    }

    #[test]
    fn test_left_shift_preserves_length() {
        for (shift, max) in [(6u32, 0x03FFu16), (4, 0x0FFF), (2, 0x3FFF)] {
            let src = samples(&[0, 1, max / 2, max]);
            let mut dst = vec![0u8; src.len()];
            left_shift16(&mut dst, &src, shift);

            assert_eq!(dst.len(), src.len());
            assert_eq!(dst, samples(&[0, 1 << shift, (max / 2) << shift, max << shift]));
        }
    }

    #[test]
    fn test_left_shift_in_place_matches_copy() {
        let src = samples(&[0x03FF, 0x0200, 0x0001]);
        let mut copied = vec![0u8; src.len()];
        left_shift16(&mut copied, &src, 6);

        let mut in_place = src.clone();
        left_shift16_in_place(&mut in_place, 6);

        assert_eq!(copied, in_place);
        assert_eq!(in_place, samples(&[0xFFC0, 0x8000, 0x0040]));
    }

    #[test]
    fn test_left_shift_leaves_odd_tail() {
        let mut buf = vec![0x01, 0x00, 0xAB];
        left_shift16_in_place(&mut buf, 4);
        assert_eq!(buf, vec![0x10, 0x00, 0xAB]);
    }

    #[test]
    fn test_encoding_table() {
        assert_eq!(PixelFormat::MONO8.encoding(), Encoding::Mono8);
        assert_eq!(PixelFormat::MONO12.encoding(), Encoding::Mono16);
        assert_eq!(PixelFormat::BAYER_GR10.encoding(), Encoding::BayerGrbg16);
        assert_eq!(PixelFormat::BAYER_BG8.encoding(), Encoding::BayerBggr8);
        assert_eq!(PixelFormat::RGBA8.encoding(), Encoding::Rgba8);
        assert_eq!(PixelFormat::YUV422_PACKED.encoding(), Encoding::Yuv422);
        assert_eq!(PixelFormat::YCBCR709_422_8_CBYCRY.encoding(), Encoding::Yuv422Yuy2);
        assert_eq!(PixelFormat(0x0108_00FF).encoding(), Encoding::Type8Uc1);
        assert_eq!(Encoding::Type8Uc1.as_str(), "8UC1");
    }

    #[test]
    fn test_name_lookup() {
        for format in PixelFormat::ALL {
            let name = format.name().expect("known format has a name");
            assert_eq!(PixelFormat::from_name(name), Some(*format));
        }
        assert_eq!(PixelFormat::from_name("Mono9"), None);
        assert_eq!(PixelFormat(0x1234).to_string(), "0x00001234");
    }
}
