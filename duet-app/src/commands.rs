//! Line commands typed at the prompt

use duet_audio::EqBand;
use std::path::PathBuf;

/// A parsed prompt command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(PathBuf),
    Play,
    Pause,
    Toggle,
    Seek(f64),
    Mic,
    Pitch(f32),
    Tempo(f32),
    Reverb(f32),
    Delay(f32),
    Eq(EqBand, f32),
    Volume(f32),
    Status,
    Scope,
    Room,
    Reconnect,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  load <path>           Load an audio file (mp3, flac, ogg, wav, aac)
  play | pause | toggle Control shared playback
  seek <secs>           Jump to a position
  mic                   Toggle microphone monitoring
  pitch <semitones>     Pitch shift, -12..12
  tempo <rate>          Track speed, 0.5..1.5
  reverb <0..1>         Reverb wet level
  delay <0..1>          Delay wet level
  eq <low|mid|high> <db> EQ band gain, -20..20
  volume <db>           Master volume, -60..0
  status                Playback and effects state
  scope                 Waveform of the current output
  room                  Room code and participants
  reconnect             Retry the shared record
  quit                  Leave the session";

/// Remove one pair of surrounding quotes
fn unquote(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Parse one input line; None when it is not a valid command
pub fn parse_command(line: &str) -> Option<Command> {
    let input = line.trim();

    // Handle load command with potential quoted path
    if let Some(rest) = input.strip_prefix("load ") {
        let path = unquote(rest.trim());
        return (!path.is_empty()).then(|| Command::Load(path.into()));
    }

    let mut words = input.split_whitespace();
    let head = words.next()?;
    let arg = words.next();
    let number = |a: Option<&str>| {
        a.and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite())
    };

    let command = match head {
        "play" => Command::Play,
        "pause" => Command::Pause,
        "toggle" | "t" => Command::Toggle,
        "seek" => Command::Seek(arg?.parse::<f64>().ok().filter(|v| v.is_finite())?),
        "mic" => Command::Mic,
        "pitch" => Command::Pitch(number(arg)?),
        "tempo" => Command::Tempo(number(arg)?),
        "reverb" => Command::Reverb(number(arg)?),
        "delay" => Command::Delay(number(arg)?),
        "eq" => {
            let band = EqBand::from_name(arg?)?;
            Command::Eq(band, number(words.next())?)
        }
        "volume" | "vol" => Command::Volume(number(arg)?),
        "status" | "s" => Command::Status,
        "scope" => Command::Scope,
        "room" => Command::Room,
        "reconnect" => Command::Reconnect,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("play"), Some(Command::Play));
        assert_eq!(parse_command("  q "), Some(Command::Quit));
        assert_eq!(parse_command("status"), Some(Command::Status));
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("dance"), None);
    }

    #[test]
    fn test_load_with_quoted_path() {
        assert_eq!(
            parse_command("load \"/music/my song.mp3\""),
            Some(Command::Load("/music/my song.mp3".into()))
        );
        assert_eq!(
            parse_command("load /music/a.wav"),
            Some(Command::Load("/music/a.wav".into()))
        );
        assert_eq!(parse_command("load "), None);
    }

    #[test]
    fn test_numeric_arguments() {
        assert_eq!(parse_command("seek 12.5"), Some(Command::Seek(12.5)));
        assert_eq!(parse_command("pitch -3"), Some(Command::Pitch(-3.0)));
        assert_eq!(parse_command("volume -12"), Some(Command::Volume(-12.0)));
        assert_eq!(parse_command("seek"), None);
        assert_eq!(parse_command("reverb lots"), None);
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        assert_eq!(parse_command("pitch nan"), None);
        assert_eq!(parse_command("volume -inf"), None);
        assert_eq!(parse_command("eq low inf"), None);
        assert_eq!(parse_command("seek NaN"), None);
        assert_eq!(parse_command("seek infinity"), None);
    }

    #[test]
    fn test_eq_command() {
        assert_eq!(
            parse_command("eq high 4"),
            Some(Command::Eq(EqBand::High, 4.0))
        );
        assert_eq!(parse_command("eq treble 4"), None);
        assert_eq!(parse_command("eq low"), None);
    }
}
