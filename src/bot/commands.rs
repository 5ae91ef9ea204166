use crate::extractors::MediaKind;

/// A chat message understood by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/dl <url>` or `/adl <url>`
    Fetch { kind: MediaKind, url: String },
    /// The command was recognized but had no URL
    Usage(MediaKind),
}

/// Parse `/dl` and `/adl`, including the `/dl@botname` form group chats use.
/// Anything else is not a relay command.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };

    let name = head.strip_prefix('/')?;
    let name = name.split_once('@').map_or(name, |(name, _)| name);

    let kind = match name.to_ascii_lowercase().as_str() {
        "dl" => MediaKind::Video,
        "adl" => MediaKind::Audio,
        _ => return None,
    };

    match rest.split_whitespace().next() {
        Some(url) => Some(Command::Fetch { kind, url: url.to_string() }),
        None => Some(Command::Usage(kind)),
    }
}

pub fn usage(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "**Usage:** `/dl <video_url>`",
        MediaKind::Audio => "**Usage:** `/adl <audio_url>`",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_commands() {
        assert_eq!(
            parse_command("/dl https://youtu.be/abc"),
            Some(Command::Fetch { kind: MediaKind::Video, url: "https://youtu.be/abc".into() })
        );
        assert_eq!(
            parse_command("  /adl   https://www.instagram.com/reel/x  extra"),
            Some(Command::Fetch { kind: MediaKind::Audio, url: "https://www.instagram.com/reel/x".into() })
        );
        assert_eq!(
            parse_command("/dl@relay_bot https://youtu.be/abc"),
            Some(Command::Fetch { kind: MediaKind::Video, url: "https://youtu.be/abc".into() })
        );
    }

    #[test]
    fn test_missing_url_is_usage() {
        assert_eq!(parse_command("/dl"), Some(Command::Usage(MediaKind::Video)));
        assert_eq!(parse_command("/adl   "), Some(Command::Usage(MediaKind::Audio)));
        assert_eq!(usage(MediaKind::Audio), "**Usage:** `/adl <audio_url>`");
    }

    #[test]
    fn test_other_text_is_ignored() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/start"), None);
        assert_eq!(parse_command("/dlx https://a.b"), None);
        assert_eq!(parse_command(""), None);
    }
}
