//! 基于魔数的内容类型探测，以及“前缀 + 剩余流”组合读取器。

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// 根据文件头推断扩展名（不含点）。
pub fn sniff_extension(head: &[u8]) -> Option<&'static str> {
    infer::get(head).map(|kind| kind.extension())
}

/// 根据文件头推断 MIME 类型。
pub fn sniff_mime(head: &[u8]) -> Option<&'static str> {
    infer::get(head).map(|kind| kind.mime_type())
}

/// 读取最多 `limit` 字节，直到填满或遇到 EOF。
pub async fn read_head<R>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(limit);
    reader.take(limit as u64).read_to_end(&mut head).await?;
    Ok(head)
}

/// 先回放已读取的前缀字节，再继续读取内层读取器。
#[derive(Debug)]
pub struct PrefixedReader<R> {
    prefix: Vec<u8>,
    pos: usize,
    inner: R,
}

impl<R> PrefixedReader<R> {
    pub fn new(prefix: Vec<u8>, inner: R) -> Self {
        Self {
            prefix,
            pos: 0,
            inner,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PrefixedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.prefix.len() {
            let remaining = &this.prefix[this.pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn detects_png_signature() {
        let mut data = PNG_MAGIC.to_vec();
        data.extend_from_slice(b"rest of image");
        assert_eq!(sniff_extension(&data), Some("png"));
        assert_eq!(sniff_mime(&data), Some("image/png"));
    }

    #[test]
    fn unknown_content_has_no_extension() {
        assert_eq!(sniff_extension(b"just some text"), None);
        assert_eq!(sniff_extension(&[]), None);
    }

    #[tokio::test]
    async fn read_head_stops_at_limit() {
        let data = vec![7u8; 100];
        let mut reader = &data[..];
        let head = read_head(&mut reader, 64).await.expect("read head");
        assert_eq!(head.len(), 64);
        assert_eq!(reader.len(), 36);
    }

    #[tokio::test]
    async fn read_head_handles_short_input() {
        let data = b"short".to_vec();
        let mut reader = &data[..];
        let head = read_head(&mut reader, 8192).await.expect("read head");
        assert_eq!(head, b"short");
    }

    #[tokio::test]
    async fn prefixed_reader_replays_whole_stream() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut source = &data[..];
        let head = read_head(&mut source, 8192).await.expect("read head");

        let mut combined = PrefixedReader::new(head, source);
        let mut out = Vec::new();
        combined.read_to_end(&mut out).await.expect("read all");
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn prefixed_reader_respects_small_buffers() {
        let mut combined = PrefixedReader::new(b"abc".to_vec(), &b"def"[..]);
        let mut out = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = combined.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abcdef");
    }
}
