use std::io::BufRead;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use super::Fragment;

/// Decodes an OpenAI-style server-sent event stream into fragments.
///
/// Each `data:` line carries one JSON chunk; `[DONE]` ends the stream. Blank
/// lines, `:` comments and other fields are skipped. An `error` object inside
/// the stream, unreadable bytes or invalid JSON end the stream with an `Err`.
pub struct SseFragments<R> {
    reader: R,
    line: Vec<u8>,
    done: bool,
}

impl<R: BufRead> SseFragments<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            done: false,
        }
    }

    fn next_data_line(&mut self) -> Result<Option<String>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .context("failed to read completion stream")?;
            if read == 0 {
                return Ok(None);
            }
            let text = String::from_utf8_lossy(&self.line);
            let text = text.trim_end_matches(['\n', '\r']);
            if let Some(data) = text.strip_prefix("data:") {
                return Ok(Some(data.trim().to_string()));
            }
        }
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = Result<Fragment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let outcome = match self.next_data_line() {
            Ok(None) => None,
            Ok(Some(data)) if data == "[DONE]" => None,
            Ok(Some(data)) => Some(parse_chunk(&data)),
            Err(err) => Some(Err(err)),
        };
        if !matches!(outcome, Some(Ok(_))) {
            self.done = true;
        }
        outcome
    }
}

fn parse_chunk(data: &str) -> Result<Fragment> {
    let chunk: Value = serde_json::from_str(data)
        .with_context(|| format!("invalid stream chunk: {}", crate::truncate_text(data, 80)))?;
    if let Some(error) = chunk.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(anyhow!("stream error: {message}"));
    }
    let choice = chunk.get("choices").and_then(|choices| choices.get(0));
    Ok(Fragment {
        delta: choice
            .and_then(|choice| choice.get("delta"))
            .and_then(|delta| delta.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string),
        finish_reason: choice
            .and_then(|choice| choice.get("finish_reason"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{self, BufRead, BufReader, Cursor, Read};

    use super::{Fragment, SseFragments};

    fn deltas(body: &str) -> Vec<Option<String>> {
        SseFragments::new(Cursor::new(body.as_bytes().to_vec()))
            .map(|item| item.ok().and_then(|fragment| fragment.delta))
            .collect()
    }

    #[test]
    fn decodes_content_deltas_until_done() {
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\r\n\r\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        assert_eq!(
            deltas(body),
            vec![None, Some("Hel".to_string()), Some("lo".to_string()), None]
        );
    }

    #[test]
    fn finish_reason_is_reported() {
        let body = "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n";
        let fragments: Vec<Fragment> = SseFragments::new(Cursor::new(body.as_bytes().to_vec()))
            .filter_map(Result::ok)
            .collect();
        assert_eq!(fragments[0].finish_reason.as_deref(), Some("length"));
    }

    #[test]
    fn stream_ending_without_done_just_stops() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n";
        assert_eq!(deltas(body), vec![Some("partial".to_string())]);
    }

    #[test]
    fn error_object_ends_stream_with_err() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
        );
        let items: Vec<_> = SseFragments::new(Cursor::new(body.as_bytes().to_vec())).collect();
        assert_eq!(items.len(), 2);
        let message = items[1]
            .as_ref()
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(message, "stream error: overloaded");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let items: Vec<_> =
            SseFragments::new(Cursor::new(b"data: {not json\n".to_vec())).collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
        }
    }

    #[test]
    fn read_errors_surface_once() {
        let reader: Box<dyn BufRead> = Box::new(BufReader::new(FailingReader));
        let items: Vec<_> = SseFragments::new(reader).collect();
        assert_eq!(items.len(), 1);
        let message = items[0]
            .as_ref()
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert!(message.contains("connection reset"), "unexpected: {message}");
    }
}
