//! Command-line argument parsing for sound_play.

use std::ffi::OsString;
use std::iter;

use clap::Parser;


/// Printed when no files are given.
pub const USAGE: &str = "Usage: sound_play [--music <file>] <file1> [file2 ...]";


/// sound_play - play sound and music files one after another.
///
/// `--music` is positional and only applies to the token right after it, so
/// every argument is collected verbatim and classified by the dispatcher.
#[derive( Parser, Debug )]
#[command( name = "sound_play" )]
#[command( disable_help_flag = true, disable_version_flag = true )]
pub struct Args {
    /// Sound files, each optionally preceded by `--music` to stream it as music.
    #[arg( trailing_var_arg = true, allow_hyphen_values = true )]
    pub files: Vec<OsString>,
}


impl Args {
    /// Parses a full argv, program name first.
    ///
    /// A `--` is inserted after the program name so clap ends option parsing
    /// there and every user token, a leading `--` included, lands in `files`.
    pub fn try_parse_argv<I>( argv: I ) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut argv = argv.into_iter();
        let program = argv.next().unwrap_or_else( || OsString::from( "sound_play" ) );

        Self::try_parse_from( iter::once( program ).chain( iter::once( OsString::from( "--" ) ) ).chain( argv ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn parse( tokens: &[&str] ) -> Vec<OsString> {
        Args::try_parse_argv( tokens.iter().map( OsString::from ) ).unwrap().files
    }


    #[test]
    fn test_keeps_music_flag_in_order() {
        let files = parse( &[ "sound_play", "a.wav", "--music", "b.ogg", "c.wav" ] );
        assert_eq!( files, vec![ "a.wav", "--music", "b.ogg", "c.wav" ] );
    }


    #[test]
    fn test_leading_music_flag_is_a_value() {
        let files = parse( &[ "sound_play", "--music", "song.mp3" ] );
        assert_eq!( files, vec![ "--music", "song.mp3" ] );
    }


    #[test]
    fn test_no_arguments() {
        assert!( parse( &[ "sound_play" ] ).is_empty() );
    }


    #[test]
    fn test_lone_double_dash_is_a_file() {
        assert_eq!( parse( &[ "sound_play", "--" ] ), vec![ "--" ] );
    }


    #[test]
    fn test_leading_double_dash_is_kept() {
        let files = parse( &[ "sound_play", "--", "a.wav" ] );
        assert_eq!( files, vec![ "--", "a.wav" ] );

        let files = parse( &[ "sound_play", "a.wav", "--", "b.wav" ] );
        assert_eq!( files, vec![ "a.wav", "--", "b.wav" ] );
    }


    #[test]
    fn test_help_is_a_file() {
        assert_eq!( parse( &[ "sound_play", "--help" ] ), vec![ "--help" ] );
    }
}
