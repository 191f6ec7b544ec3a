//! CoreVideo pixel format codes known to the capture pipeline.
//!
//! Codes are either small integers (the legacy QuickDraw depths such as
//! `0x20` for 32-bit ARGB) or big-endian four-character codes such as
//! `'420v'`.  The table below lists every format the device can advertise.

/// Packs a four-character code into its big-endian `u32` value.
///
/// `fourcc(b"420v")` yields `0x3432_3076`, matching the value of
/// `kCVPixelFormatType_420YpCbCr8BiPlanarVideoRange`.
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    ((code[0] as u32) << 24) | ((code[1] as u32) << 16) | ((code[2] as u32) << 8) | code[3] as u32
}

/// Every supported `(code, name)` pair, in no particular order.
///
/// [`crate::catalog::list_formats`] sorts this table by code before handing
/// it out, so the order here only affects readability.
pub(crate) const PIXEL_FORMATS: &[(u32, &str)] = &[
    (0x0000_0001, "kCVPixelFormatType_1Monochrome"),
    (0x0000_0002, "kCVPixelFormatType_2Indexed"),
    (0x0000_0004, "kCVPixelFormatType_4Indexed"),
    (0x0000_0008, "kCVPixelFormatType_8Indexed"),
    (0x0000_0021, "kCVPixelFormatType_1IndexedGray_WhiteIsZero"),
    (0x0000_0022, "kCVPixelFormatType_2IndexedGray_WhiteIsZero"),
    (0x0000_0024, "kCVPixelFormatType_4IndexedGray_WhiteIsZero"),
    (0x0000_0028, "kCVPixelFormatType_8IndexedGray_WhiteIsZero"),
    (0x0000_0010, "kCVPixelFormatType_16BE555"),
    (fourcc(b"L555"), "kCVPixelFormatType_16LE555"),
    (fourcc(b"5551"), "kCVPixelFormatType_16LE5551"),
    (fourcc(b"B565"), "kCVPixelFormatType_16BE565"),
    (fourcc(b"L565"), "kCVPixelFormatType_16LE565"),
    (0x0000_0018, "kCVPixelFormatType_24RGB"),
    (fourcc(b"24BG"), "kCVPixelFormatType_24BGR"),
    (0x0000_0020, "kCVPixelFormatType_32ARGB"),
    (fourcc(b"BGRA"), "kCVPixelFormatType_32BGRA"),
    (fourcc(b"ABGR"), "kCVPixelFormatType_32ABGR"),
    (fourcc(b"RGBA"), "kCVPixelFormatType_32RGBA"),
    (fourcc(b"b64a"), "kCVPixelFormatType_64ARGB"),
    (fourcc(b"b48r"), "kCVPixelFormatType_48RGB"),
    (fourcc(b"b32a"), "kCVPixelFormatType_32AlphaGray"),
    (fourcc(b"b16g"), "kCVPixelFormatType_16Gray"),
    (fourcc(b"2vuy"), "kCVPixelFormatType_422YpCbCr8"),
    (fourcc(b"v408"), "kCVPixelFormatType_4444YpCbCrA8"),
    (fourcc(b"r408"), "kCVPixelFormatType_4444YpCbCrA8R"),
    (fourcc(b"v308"), "kCVPixelFormatType_444YpCbCr8"),
    (fourcc(b"v216"), "kCVPixelFormatType_422YpCbCr16"),
    (fourcc(b"v210"), "kCVPixelFormatType_422YpCbCr10"),
    (fourcc(b"v410"), "kCVPixelFormatType_444YpCbCr10"),
    (fourcc(b"y420"), "kCVPixelFormatType_420YpCbCr8Planar"),
    (fourcc(b"f420"), "kCVPixelFormatType_420YpCbCr8PlanarFullRange"),
    (fourcc(b"a2vy"), "kCVPixelFormatType_422YpCbCr_4A_8BiPlanar"),
    (fourcc(b"420v"), "kCVPixelFormatType_420YpCbCr8BiPlanarVideoRange"),
    (fourcc(b"420f"), "kCVPixelFormatType_420YpCbCr8BiPlanarFullRange"),
    (fourcc(b"yuvs"), "kCVPixelFormatType_422YpCbCr8_yuvs"),
    (fourcc(b"yuvf"), "kCVPixelFormatType_422YpCbCr8FullRange"),
];
