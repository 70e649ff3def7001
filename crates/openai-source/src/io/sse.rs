use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Chunks(ChunksError),
    InvalidPayload,
}

/// A type for reading the `data` of server-sent events from a chunk stream.
///
/// Only the `data` field is collected. Comments and other fields (`event`,
/// `id`, `retry`) are skipped. Lines may end with `\n` or `\r\n`.
pub struct Sse {
    buf: Vec<u8>,
    data: Option<String>,
    chunks: Chunks,
    eof: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            data: None,
            chunks,
            eof: false,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain complete lines first, a chunk may hold several events.
            while let Some(line) = self.take_line()? {
                if let Some(event) = self.process_line(&line) {
                    return Ok(Some(event));
                }
            }

            // An event without its terminating blank line is discarded.
            if self.eof {
                return Ok(None);
            }

            match self.chunks.next_chunk().await.map_err(Error::Chunks)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, Error> {
        let Some(eol_idx) = self.buf.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let mut line: Vec<u8> = self.buf.drain(..=eol_idx).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        // Decoding whole lines keeps multi-byte characters that straddle
        // two chunks intact.
        String::from_utf8(line)
            .map(Some)
            .map_err(|_| Error::InvalidPayload)
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        if line.is_empty() {
            return self.data.take();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        if field != "data" {
            trace!("skipping sse field: {field}");
            return None;
        }
        match &mut self.data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => self.data = Some(value.to_owned()),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn sse_of(chunks: Vec<Bytes>) -> Sse {
        Sse::new(Chunks::from_vec_deque(chunks.into()))
    }

    #[tokio::test]
    async fn test_normal_events() {
        let mut sse = sse_of(vec![
            Bytes::from_static(b"data: hello\n\n"),
            Bytes::from_static(b"data: bye\n\n"),
        ]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let mut sse = sse_of(vec![
            Bytes::from_static(b"data:"),
            Bytes::from_static(b" hello\r\n"),
            Bytes::from_static(b"\r\n"),
        ]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_multibyte_char() {
        let event = "data: Meow 😸\n\n".as_bytes();
        let (head, tail) = event.split_at(13);
        let mut sse =
            sse_of(vec![Bytes::from_static(head), Bytes::from_static(tail)]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "Meow 😸");
    }

    #[tokio::test]
    async fn test_comments_fields_and_multiline_data() {
        let mut sse = sse_of(vec![Bytes::from_static(
            b": keep-alive\n\nevent: chunk\nid: 7\ndata:a\ndata: b\n\n",
        )]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "a\nb");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incomplete_or_invalid_data() {
        let mut sse = sse_of(vec![
            Bytes::from_static(b"data: hello\n"),
            Bytes::from_static(b"data: bye\n"),
        ]);
        assert_eq!(sse.next_event().await.unwrap(), None);

        let mut sse = sse_of(vec![Bytes::from_static(b"xxxxxx\n\n")]);
        assert_eq!(sse.next_event().await.unwrap(), None);

        let mut sse = sse_of(vec![Bytes::from_static(b"data: \xff\xfe\n\n")]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);
    }
}
