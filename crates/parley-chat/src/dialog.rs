//! Renders a transcript as a theater-script dialog.

use parley_core::types::Turn;

use crate::error::ChatError;

/// Render `turns` as `speaker: text` lines, followed by an open line for
/// the first speaker to continue.
///
/// ```text
/// user: Hi
/// bot: Hello
/// user:
/// ```
///
/// The trailing line keeps its `": "` separator. Each rendered turn is
/// trimmed, so a turn with empty text renders as `speaker:`.
pub fn build_dialog(turns: &[Turn]) -> Result<String, ChatError> {
    let first = turns
        .first()
        .ok_or_else(|| ChatError::InvalidInput("transcript is empty".to_string()))?;

    let mut lines: Vec<String> = turns
        .iter()
        .map(|t| format!("{}: {}", t.speaker, t.text).trim().to_string())
        .collect();
    lines.push(format!("{}: ", first.speaker));

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_turns() {
        let turns = vec![
            Turn::new("user", "Hi"),
            Turn::new("bot", "Hello"),
            Turn::new("user", "Tell me about climate change"),
        ];
        let dialog = build_dialog(&turns).unwrap();
        assert_eq!(
            dialog,
            "user: Hi\nbot: Hello\nuser: Tell me about climate change\nuser: "
        );
    }

    #[test]
    fn test_ends_with_first_speaker_open_line() {
        let turns = vec![Turn::new("bot", "Welcome!"), Turn::new("user", "Thanks")];
        let dialog = build_dialog(&turns).unwrap();
        let last = dialog.lines().last().unwrap();
        assert_eq!(last, "bot: ");
        assert!(dialog.ends_with("\nbot: "));
    }

    #[test]
    fn test_turns_are_trimmed() {
        let turns = vec![Turn::new("  user", "Hi there   \n")];
        let dialog = build_dialog(&turns).unwrap();
        assert_eq!(dialog, "user: Hi there\n  user: ");
    }

    #[test]
    fn test_empty_text_turn() {
        let turns = vec![Turn::new("user", "")];
        assert_eq!(build_dialog(&turns).unwrap(), "user:\nuser: ");
    }

    #[test]
    fn test_empty_transcript_is_invalid_input() {
        let err = build_dialog(&[]).unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }
}
