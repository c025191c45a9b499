//! Fake uploaded files.

use effigy_core::http::request::UploadedFile;

/// Builds [`UploadedFile`] values for request descriptors.
///
/// Media types are guessed from the file extension, never from the
/// content, so a `photo.txt` image fixture reports `text/plain`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFactory;

impl FileFactory {
    /// Create a factory.
    pub fn new() -> Self {
        Self
    }

    /// An empty file, optionally reporting a size in kilobytes.
    ///
    /// The size is reported without materializing content.
    pub fn create_file(&self, filename: &str, kilobytes: Option<usize>) -> UploadedFile {
        let file = UploadedFile::new(filename, Vec::new(), mime_for(filename));
        match kilobytes {
            Some(kilobytes) => file.with_size(kilobytes * 1024),
            None => file,
        }
    }

    /// A file with the given content.
    pub fn create_file_with_content(&self, filename: &str, content: impl Into<Vec<u8>>) -> UploadedFile {
        UploadedFile::new(filename, content.into(), mime_for(filename))
    }

    /// An image file whose bytes carry the format signature of the
    /// extension and the given dimensions.
    ///
    /// Supported formats: `png` and `bmp` (complete images), `gif`,
    /// `webp` and `jpeg` (signature and header). Anything else falls
    /// back to jpeg content.
    pub fn create_image(&self, filename: &str, width: u32, height: u32) -> UploadedFile {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let content = match extension.as_str() {
            "png" => png_bytes(width, height),
            "bmp" => bmp_bytes(width, height),
            "gif" => gif_bytes(width, height),
            "webp" => webp_bytes(),
            _ => jpeg_bytes(width, height),
        };
        UploadedFile::new(filename, content, mime_for(filename))
    }
}

/// Media type for a filename, by extension.
fn mime_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// A complete truecolor PNG of black pixels.
fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    // Bit depth 8, truecolor, default compression/filter, no interlace.
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
    png_chunk(&mut out, b"IHDR", &ihdr);

    // Scanlines of filter byte + zeroed rgb, wrapped in a zlib stream of
    // stored deflate blocks.
    let row = 1 + width as usize * 3;
    let raw = vec![0u8; row * height as usize];
    let mut idat = vec![0x78, 0x01];
    let mut rest = raw.as_slice();
    loop {
        let take = rest.len().min(65_535);
        let (block, tail) = rest.split_at(take);
        idat.push(u8::from(tail.is_empty()));
        idat.extend_from_slice(&(take as u16).to_le_bytes());
        idat.extend_from_slice(&(!(take as u16)).to_le_bytes());
        idat.extend_from_slice(block);
        if tail.is_empty() {
            break;
        }
        rest = tail;
    }
    idat.extend_from_slice(&adler32(&raw).to_be_bytes());
    png_chunk(&mut out, b"IDAT", &idat);
    png_chunk(&mut out, b"IEND", &[]);
    out
}

fn png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut checked = Vec::with_capacity(4 + data.len());
    checked.extend_from_slice(kind);
    checked.extend_from_slice(data);
    out.extend_from_slice(&crc32(&checked).to_be_bytes());
}

/// A complete 24-bit uncompressed BMP of black pixels.
fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    // Rows are padded to four bytes.
    let row = (width * 3).div_ceil(4) * 4;
    let pixels = row * height;
    let size = 54 + pixels;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&54u32.to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&pixels.to_le_bytes());
    out.extend_from_slice(&[0; 16]);
    out.resize(out.len() + pixels as usize, 0);
    out
}

/// SOI, JFIF header and an SOF0 frame carrying the dimensions.
fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let width = width.min(65_535) as u16;
    let height = height.min(65_535) as u16;
    let mut out = vec![0xFF, 0xD8];
    out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    out.extend_from_slice(b"JFIF\0");
    out.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&[0x03, 0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// GIF89a header, screen descriptor with the dimensions and trailer.
fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    let width = width.min(65_535) as u16;
    let height = height.min(65_535) as u16;
    let mut out = Vec::new();
    out.extend_from_slice(b"GIF89a");
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&[0x80, 0x00, 0x00]);
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF]);
    out.push(0x3B);
    out
}

/// RIFF container signature.
fn webp_bytes() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(b"WEBP");
    out
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + u32::from(byte)) % 65_521;
        b = (b + a) % 65_521;
    }
    (b << 16) | a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_reports_requested_size() {
        let file = FileFactory::new().create_file("report.pdf", Some(2));
        assert_eq!(file.size(), 2048);
        assert!(file.content.is_empty());
        assert_eq!(file.mime, "application/pdf");
    }

    #[test]
    fn content_file_reports_content_size() {
        let file = FileFactory::new().create_file_with_content("notes.txt", "hello");
        assert_eq!(file.size(), 5);
        assert_eq!(file.mime, "text/plain");
    }

    #[test]
    fn png_image_carries_signature_and_dimensions() {
        let file = FileFactory::new().create_image("avatar.png", 50, 40);
        assert_eq!(file.mime, "image/png");
        assert_eq!(&file.content[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        // Width and height sit right after the IHDR chunk type.
        assert_eq!(&file.content[16..20], &50u32.to_be_bytes());
        assert_eq!(&file.content[20..24], &40u32.to_be_bytes());
    }

    #[test]
    fn bmp_image_is_complete() {
        let file = FileFactory::new().create_image("flat.bmp", 2, 2);
        assert_eq!(&file.content[..2], b"BM");
        // Two padded rows of two rgb pixels after the 54-byte header.
        assert_eq!(file.content.len(), 54 + 16);
    }

    #[test]
    fn unknown_extension_falls_back_to_jpeg_content() {
        let file = FileFactory::new().create_image("picture.tiff", 10, 10);
        assert_eq!(&file.content[..2], &[0xFF, 0xD8]);
        // The media type still follows the extension.
        assert_eq!(file.mime, "application/octet-stream");
    }
}
