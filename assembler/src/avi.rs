use std::io::{self, Seek, SeekFrom, Write};

use tracing::debug;

/// Minimal AVI 1.0 (RIFF) writer for a single MJPG video stream.
///
/// File layout:
///
///   RIFF <size> 'AVI '
///     LIST <size> 'hdrl'
///       'avih' 56   main header (frame period, frame count, size)
///       LIST <size> 'strl'
///         'strh' 56   stream header ('vids', handler 'MJPG', rate = fps)
///         'strf' 40   BITMAPINFOHEADER (compression 'MJPG', 24 bpp)
///     LIST <size> 'movi'
///       '00dc' <len> <jpeg bytes> [pad to even]
///       ...
///     'idx1' <16 * n>  one entry per frame, offsets relative to 'movi'
///
/// The header block has a fixed length, so it is written with placeholder
/// counts up front and rewritten in place by [`AviWriter::finish`].
pub struct AviWriter<W: Write + Seek> {
    inner: W,
    width: u32,
    height: u32,
    fps: u32,
    index: Vec<IndexEntry>,
    /// Bytes of frame chunks written after the 'movi' fourcc.
    movi_bytes: u64,
    max_chunk: u32,
}

struct IndexEntry {
    offset: u32,
    size: u32,
}

pub const FOURCC_MJPG: &[u8; 4] = b"MJPG";

/// Bytes from the start of the file through the 'movi' fourcc.
const HEADER_LEN: u64 = 224;
const AVIH_LEN: u32 = 56;
const STRH_LEN: u32 = 56;
const STRF_LEN: u32 = 40;
const STRL_LEN: u32 = 4 + (8 + STRH_LEN) + (8 + STRF_LEN);
const HDRL_LEN: u32 = 4 + (8 + AVIH_LEN) + (8 + STRL_LEN);

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const INDEX_ENTRY_LEN: u64 = 16;

impl<W: Write + Seek> AviWriter<W> {
    pub fn new(inner: W, width: u32, height: u32, fps: u32) -> io::Result<Self> {
        if width == 0 || height == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid frame size {width}x{height}"),
            ));
        }
        if fps == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "fps must be positive"));
        }

        let mut writer = Self {
            inner,
            width,
            height,
            fps,
            index: Vec::new(),
            movi_bytes: 0,
            max_chunk: 0,
        };
        writer.write_header(0)?;
        debug!(width, height, fps, "AVI stream opened");
        Ok(writer)
    }

    /// Append one JPEG-compressed frame.
    pub fn write_frame(&mut self, jpeg: &[u8]) -> io::Result<()> {
        let size = u32::try_from(jpeg.len()).map_err(|_| too_large())?;
        let offset = u32::try_from(4 + self.movi_bytes).map_err(|_| too_large())?;
        let padded = jpeg.len() as u64 + (jpeg.len() as u64 & 1);

        self.inner.write_all(b"00dc")?;
        self.inner.write_all(&size.to_le_bytes())?;
        self.inner.write_all(jpeg)?;
        if size & 1 == 1 {
            self.inner.write_all(&[0])?;
        }

        self.movi_bytes += 8 + padded;
        self.max_chunk = self.max_chunk.max(size);
        self.index.push(IndexEntry { offset, size });
        Ok(())
    }

    pub fn frame_count(&self) -> u32 {
        self.index.len() as u32
    }

    /// Write the index, patch the header with final sizes, and hand back the
    /// inner writer positioned at the end of the file.
    pub fn finish(mut self) -> io::Result<W> {
        let idx_len = INDEX_ENTRY_LEN * self.index.len() as u64;
        let idx_size = u32::try_from(idx_len).map_err(|_| too_large())?;

        self.inner.write_all(b"idx1")?;
        self.inner.write_all(&idx_size.to_le_bytes())?;
        for entry in &self.index {
            self.inner.write_all(b"00dc")?;
            self.inner.write_all(&AVIIF_KEYFRAME.to_le_bytes())?;
            self.inner.write_all(&entry.offset.to_le_bytes())?;
            self.inner.write_all(&entry.size.to_le_bytes())?;
        }

        let file_len = HEADER_LEN + self.movi_bytes + 8 + idx_len;
        let riff_size = u32::try_from(file_len - 8).map_err(|_| too_large())?;

        self.inner.seek(SeekFrom::Start(0))?;
        self.write_header(riff_size)?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;

        debug!(frames = self.index.len(), bytes = file_len, "AVI stream finalized");
        Ok(self.inner)
    }

    fn write_header(&mut self, riff_size: u32) -> io::Result<()> {
        let frames = self.frame_count();
        let movi_size = (4 + self.movi_bytes) as u32;
        let usec_per_frame = 1_000_000 / self.fps;
        let max_bytes_per_sec = self.max_chunk.saturating_mul(self.fps);
        let rect_w = self.width.min(i16::MAX as u32) as u16;
        let rect_h = self.height.min(i16::MAX as u32) as u16;

        let mut buf = Vec::with_capacity(HEADER_LEN as usize);
        chunk_header(&mut buf, b"RIFF", riff_size);
        buf.extend_from_slice(b"AVI ");

        chunk_header(&mut buf, b"LIST", HDRL_LEN);
        buf.extend_from_slice(b"hdrl");

        // MainAVIHeader
        chunk_header(&mut buf, b"avih", AVIH_LEN);
        put_u32(&mut buf, usec_per_frame);
        put_u32(&mut buf, max_bytes_per_sec);
        put_u32(&mut buf, 0); // padding granularity
        put_u32(&mut buf, AVIF_HASINDEX);
        put_u32(&mut buf, frames);
        put_u32(&mut buf, 0); // initial frames
        put_u32(&mut buf, 1); // streams
        put_u32(&mut buf, self.max_chunk);
        put_u32(&mut buf, self.width);
        put_u32(&mut buf, self.height);
        buf.extend_from_slice(&[0; 16]);

        chunk_header(&mut buf, b"LIST", STRL_LEN);
        buf.extend_from_slice(b"strl");

        // AVIStreamHeader
        chunk_header(&mut buf, b"strh", STRH_LEN);
        buf.extend_from_slice(b"vids");
        buf.extend_from_slice(FOURCC_MJPG);
        put_u32(&mut buf, 0); // flags
        put_u16(&mut buf, 0); // priority
        put_u16(&mut buf, 0); // language
        put_u32(&mut buf, 0); // initial frames
        put_u32(&mut buf, 1); // scale
        put_u32(&mut buf, self.fps); // rate
        put_u32(&mut buf, 0); // start
        put_u32(&mut buf, frames); // length
        put_u32(&mut buf, self.max_chunk);
        put_u32(&mut buf, u32::MAX); // quality: driver default
        put_u32(&mut buf, 0); // sample size
        put_u16(&mut buf, 0);
        put_u16(&mut buf, 0);
        put_u16(&mut buf, rect_w);
        put_u16(&mut buf, rect_h);

        // BITMAPINFOHEADER
        chunk_header(&mut buf, b"strf", STRF_LEN);
        put_u32(&mut buf, STRF_LEN);
        put_u32(&mut buf, self.width);
        put_u32(&mut buf, self.height);
        put_u16(&mut buf, 1); // planes
        put_u16(&mut buf, 24); // bit count
        buf.extend_from_slice(FOURCC_MJPG);
        put_u32(&mut buf, self.width.saturating_mul(self.height).saturating_mul(3));
        buf.extend_from_slice(&[0; 16]);

        chunk_header(&mut buf, b"LIST", movi_size);
        buf.extend_from_slice(b"movi");

        debug_assert_eq!(buf.len() as u64, HEADER_LEN);
        self.inner.write_all(&buf)
    }
}

fn chunk_header(buf: &mut Vec<u8>, id: &[u8; 4], size: u32) {
    buf.extend_from_slice(id);
    put_u32(buf, size);
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn too_large() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "AVI file would exceed 4 GiB")
}
