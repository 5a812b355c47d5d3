//! Decoder for the line-oriented token protocol of the generation stream.
//!
//! Each event line looks like `data:{"token":{"text":"..."}}`. The decoder
//! is deliberately forgiving: transport chunks need not align with lines,
//! so a line that fails to decode is counted and skipped, never fatal.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use parley_core::types::TokenEvent;

use crate::error::DecodeError;

/// Framing prefix of every event line.
pub const FRAME_PREFIX: &str = "data:";

#[derive(Deserialize)]
struct TokenRecord {
    token: TokenPayload,
}

#[derive(Deserialize)]
struct TokenPayload {
    text: String,
}

/// Per-exchange decoder state.
#[derive(Debug, Default)]
pub struct TokenDecoder {
    /// A non-empty token has been decoded in this exchange.
    seen_text: bool,
    skipped_lines: u64,
}

impl TokenDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw transport chunk into token events, in line order.
    ///
    /// A token that is exactly `"\n"` is flagged as a stop signal once some
    /// non-empty token has already been seen. This is an end-of-utterance
    /// heuristic: a leading newline never stops the exchange.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<TokenEvent> {
        let text = String::from_utf8_lossy(chunk);
        let mut events = Vec::new();

        for line in text.split('\n') {
            if line.trim().is_empty() {
                continue;
            }
            match decode_line(line) {
                Ok(token) => {
                    let is_stop_signal = token == "\n" && self.seen_text;
                    if !token.is_empty() {
                        self.seen_text = true;
                    }
                    events.push(TokenEvent {
                        text: token,
                        is_stop_signal,
                    });
                }
                Err(e) => {
                    self.skipped_lines += 1;
                    debug!(error = %e, line = %line, "Skipping undecodable stream line");
                }
            }
        }

        events
    }

    /// Lines skipped so far because they could not be decoded.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }
}

/// Strip the framing prefix from one line and extract the token text.
pub fn decode_line(line: &str) -> Result<String, DecodeError> {
    let payload = line
        .strip_prefix(FRAME_PREFIX)
        .ok_or(DecodeError::MissingPrefix)?;
    let record: TokenRecord = serde_json::from_str(payload)?;
    Ok(record.token.text)
}

/// Drain a response stream and return the decoded reply text.
pub async fn collect_reply<S>(stream: S) -> String
where
    S: Stream<Item = Bytes>,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = TokenDecoder::new();
    let mut reply = String::new();

    while let Some(chunk) = stream.next().await {
        for event in decoder.decode(&chunk) {
            reply.push_str(&event.text);
        }
    }

    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> String {
        format!(
            "data:{}\n",
            serde_json::json!({"token": {"id": 1, "text": text, "logprob": -0.1, "special": false}})
        )
    }

    #[test]
    fn test_decode_single_line() {
        let mut decoder = TokenDecoder::new();
        let events = decoder.decode(br#"data: {"token":{"text":"It's"}}"#);
        assert_eq!(
            events,
            vec![TokenEvent {
                text: "It's".to_string(),
                is_stop_signal: false
            }]
        );
    }

    #[test]
    fn test_decode_multiple_lines_and_blank_lines() {
        let mut decoder = TokenDecoder::new();
        let chunk = format!("{}\n\n{}\r\n", line("Hello"), line(" world").trim_end());
        let events = decoder.decode(chunk.as_bytes());
        let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", " world"]);
        assert_eq!(decoder.skipped_lines(), 0);
    }

    #[test]
    fn test_malformed_line_is_skipped_not_fatal() {
        let mut decoder = TokenDecoder::new();
        let chunk = format!(
            "{}data: {{\"token\":{{\"te\n{}garbage\n{}",
            line("a"),
            line("b"),
            line("c")
        );
        let events = decoder.decode(chunk.as_bytes());
        let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(decoder.skipped_lines(), 2);
    }

    #[test]
    fn test_line_without_prefix_is_skipped() {
        let mut decoder = TokenDecoder::new();
        let events = decoder.decode(br#"{"token":{"text":"x"}}"#);
        assert!(events.is_empty());
        assert_eq!(decoder.skipped_lines(), 1);
    }

    #[test]
    fn test_leading_newline_is_not_a_stop_signal() {
        let mut decoder = TokenDecoder::new();
        let events = decoder.decode(line("\n").as_bytes());
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_stop_signal);
    }

    #[test]
    fn test_newline_after_text_is_stop_signal() {
        let mut decoder = TokenDecoder::new();
        assert!(!decoder.decode(line("It's").as_bytes())[0].is_stop_signal);
        let events = decoder.decode(line("\n").as_bytes());
        assert!(events[0].is_stop_signal);
    }

    #[test]
    fn test_empty_tokens_do_not_arm_stop_signal() {
        let mut decoder = TokenDecoder::new();
        decoder.decode(line("").as_bytes());
        let events = decoder.decode(line("\n").as_bytes());
        assert!(!events[0].is_stop_signal);
        // The leading newline itself arms the heuristic.
        let events = decoder.decode(line("\n").as_bytes());
        assert!(events[0].is_stop_signal);
    }

    #[test]
    fn test_newline_with_other_text_is_not_stop_signal() {
        let mut decoder = TokenDecoder::new();
        decoder.decode(line("Hi").as_bytes());
        let events = decoder.decode(line(".\n").as_bytes());
        assert!(!events[0].is_stop_signal);
    }

    #[test]
    fn test_decode_line_errors() {
        assert!(matches!(
            decode_line("event: ping"),
            Err(DecodeError::MissingPrefix)
        ));
        assert!(matches!(
            decode_line("data: [DONE]"),
            Err(DecodeError::InvalidRecord(_))
        ));
        assert_eq!(decode_line(line("ok").trim_end()).unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_collect_reply() {
        let chunks = vec![
            Bytes::from(line("It's")),
            Bytes::from(line(" fake.")),
            Bytes::from(line("\n")),
        ];
        let reply = collect_reply(futures::stream::iter(chunks)).await;
        assert_eq!(reply, "It's fake.\n");
    }
}
