//! Argument dispatch
//!
//! Walks the arguments left to right, turning each into a playback request
//! and running it against the session before looking at the next one.

use std::ffi::OsString;
use std::io::Write;
use std::path::{ Path, PathBuf };

use soundplay_core::{ AudioSession, PlayError };
use thiserror::Error;

use crate::cli::USAGE;


/// Flag that marks the next argument as music.
pub const MUSIC_FLAG: &str = "--music";


/// A single classified argument.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum Request {
    Sound( PathBuf ),
    Music( PathBuf ),
}


impl Request {
    pub fn path( &self ) -> &Path {
        match self {
            Request::Sound( path ) | Request::Music( path ) => path,
        }
    }
}


/// Problems found while walking the arguments.
#[derive( Debug, Error, PartialEq, Eq )]
pub enum DispatchError {
    #[error( "Error: --music requires a filename argument" )]
    MissingMusicArgument,

    #[error( "File not found: {}", .0.display() )]
    FileNotFound( PathBuf ),
}


/// Iterator classifying raw arguments into [`Request`]s.
///
/// `--music` consumes itself and the following token; anything else is a
/// sound. A trailing `--music` yields [`DispatchError::MissingMusicArgument`].
pub struct Requests<I> {
    args: I,
}


impl<I> Iterator for Requests<I>
where
    I: Iterator<Item = OsString>,
{
    type Item = Result<Request, DispatchError>;


    fn next( &mut self ) -> Option<Self::Item> {
        let arg = self.args.next()?;

        if arg != MUSIC_FLAG {
            return Some( Ok( Request::Sound( arg.into() ) ) );
        }

        Some( match self.args.next() {
            Some( file ) => Ok( Request::Music( file.into() ) ),
            None => Err( DispatchError::MissingMusicArgument ),
        })
    }
}


/// Classifies `args` (program name already stripped).
pub fn requests<A>( args: A ) -> Requests<A::IntoIter>
where
    A: IntoIterator<Item = OsString>,
{
    Requests { args: args.into_iter() }
}


/// Status contributed by one playback attempt.
fn status( result: &Result<(), PlayError> ) -> i32 {
    match result {
        Ok(()) => 0,
        Err( _ ) => 1,
    }
}


/// Plays every request in `args` in order and returns the OR of all failures.
///
/// Missing files are reported and skipped. A trailing `--music` is reported
/// and stops the walk.
pub fn dispatch<S, A>( args: A, session: &mut S, out: &mut dyn Write ) -> i32
where
    S: AudioSession,
    A: IntoIterator<Item = OsString>,
{
    let mut rc = 0;

    for request in requests( args ) {
        let request = match request {
            Ok( request ) => request,
            Err( e ) => {
                tracing::info!( "{}", e );
                let _ = writeln!( out, "{}", e );
                rc = 1;
                break;
            }
        };

        if !request.path().exists() {
            let e = DispatchError::FileNotFound( request.path().to_path_buf() );
            tracing::info!( "{}", e );
            let _ = writeln!( out, "{}", e );
            rc = 1;
            continue;
        }

        let result = match request {
            Request::Sound( ref path ) => session.play_sound( path, out ),
            Request::Music( ref path ) => session.play_music( path, out ),
        };
        rc |= status( &result );
    }

    rc
}


/// Normalizes an aggregate into the process exit status.
pub fn exit_status( rc: i32 ) -> u8 {
    if rc != 0 { 1 } else { 0 }
}


/// Runs a whole invocation and returns the process exit status.
///
/// With no files the usage line is printed and the session is left untouched.
pub fn run_invocation<S: AudioSession>( files: Vec<OsString>, session: &mut S, out: &mut dyn Write ) -> u8 {
    if files.is_empty() {
        let _ = writeln!( out, "{}", USAGE );
        return 1;
    }

    exit_status( dispatch( files, session, out ) )
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use soundplay_core::{ PlaybackKind, Playing };


    struct Done;

    impl Playing for Done {
        fn is_busy( &self ) -> bool {
            false
        }
    }


    /// Session that records what it was asked to play.
    #[derive( Default )]
    struct RecordingSession {
        played: Vec<( PlaybackKind, PathBuf )>,
        refuse: Option<PathBuf>,
    }

    impl AudioSession for RecordingSession {
        type Handle = Done;

        fn start_sound( &mut self, path: &Path ) -> Result<Done, PlayError> {
            if self.refuse.as_deref() == Some( path ) {
                return Err( PlayError::NoFreeChannel { path: path.to_path_buf() } );
            }
            self.played.push( ( PlaybackKind::Sound, path.to_path_buf() ) );
            Ok( Done )
        }

        fn start_music( &mut self, path: &Path ) -> Result<Done, PlayError> {
            self.played.push( ( PlaybackKind::Music, path.to_path_buf() ) );
            Ok( Done )
        }

        fn poll_interval( &self, _kind: PlaybackKind ) -> Duration {
            Duration::ZERO
        }
    }


    /// Creates empty files named `names` in a temp dir.
    fn fixture( names: &[&str] ) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write( dir.path().join( name ), b"" ).unwrap();
        }
        dir
    }


    fn args( dir: &Path, tokens: &[&str] ) -> Vec<OsString> {
        tokens
            .iter()
            .map( |t| if t.starts_with( "--" ) { OsString::from( t ) } else { dir.join( t ).into_os_string() } )
            .collect()
    }


    fn run( dir: &Path, tokens: &[&str], session: &mut RecordingSession ) -> ( i32, String ) {
        let mut out = Vec::new();
        let rc = dispatch( args( dir, tokens ), session, &mut out );
        let text = String::from_utf8( out ).unwrap().replace( &format!( "{}/", dir.display() ), "" );
        ( rc, text )
    }


    fn os( tokens: &[&str] ) -> Vec<OsString> {
        tokens.iter().map( OsString::from ).collect()
    }


    #[test]
    fn test_requests_music_consumes_one_token() {
        let parsed: Vec<_> = requests( os( &[ "--music", "a.wav", "b.wav" ] ) ).collect();
        assert_eq!( parsed, vec![
            Ok( Request::Music( PathBuf::from( "a.wav" ) ) ),
            Ok( Request::Sound( PathBuf::from( "b.wav" ) ) ),
        ]);
    }


    #[test]
    fn test_requests_repeated_music_pairs() {
        let parsed: Vec<_> = requests( os( &[ "x.wav", "--music", "a.ogg", "--music", "b.ogg" ] ) ).collect();
        assert_eq!( parsed, vec![
            Ok( Request::Sound( PathBuf::from( "x.wav" ) ) ),
            Ok( Request::Music( PathBuf::from( "a.ogg" ) ) ),
            Ok( Request::Music( PathBuf::from( "b.ogg" ) ) ),
        ]);
    }


    #[test]
    fn test_requests_trailing_music_flag() {
        let parsed: Vec<_> = requests( os( &[ "a.wav", "--music" ] ) ).collect();
        assert_eq!( parsed, vec![
            Ok( Request::Sound( PathBuf::from( "a.wav" ) ) ),
            Err( DispatchError::MissingMusicArgument ),
        ]);
    }


    #[test]
    fn test_single_good_sound() {
        let dir = fixture( &[ "good.wav" ] );
        let mut session = RecordingSession::default();

        let ( rc, text ) = run( dir.path(), &[ "good.wav" ], &mut session );
        assert_eq!( rc, 0 );
        assert_eq!( text, "Playing sound: good.wav\n" );
        assert_eq!( session.played.len(), 1 );
    }


    #[test]
    fn test_missing_file_is_reported_and_skipped() {
        let dir = fixture( &[ "good.wav" ] );
        let mut session = RecordingSession::default();

        let ( rc, text ) = run( dir.path(), &[ "missing.wav", "good.wav" ], &mut session );
        assert_eq!( rc, 1 );
        assert_eq!( text, "File not found: missing.wav\nPlaying sound: good.wav\n" );
        assert_eq!( session.played, vec![ ( PlaybackKind::Sound, dir.path().join( "good.wav" ) ) ] );
    }


    #[test]
    fn test_music_then_sound_in_order() {
        let dir = fixture( &[ "song.mp3", "good.wav" ] );
        let mut session = RecordingSession::default();

        let ( rc, text ) = run( dir.path(), &[ "--music", "song.mp3", "good.wav" ], &mut session );
        assert_eq!( rc, 0 );
        assert_eq!( text, "Playing music: song.mp3\nPlaying sound: good.wav\n" );
        assert_eq!( session.played, vec![
            ( PlaybackKind::Music, dir.path().join( "song.mp3" ) ),
            ( PlaybackKind::Sound, dir.path().join( "good.wav" ) ),
        ]);
    }


    #[test]
    fn test_music_flag_alone() {
        let dir = fixture( &[] );
        let mut session = RecordingSession::default();

        let ( rc, text ) = run( dir.path(), &[ "--music" ], &mut session );
        assert_eq!( rc, 1 );
        assert_eq!( text, "Error: --music requires a filename argument\n" );
        assert!( session.played.is_empty() );
    }


    #[test]
    fn test_missing_music_file_continues() {
        let dir = fixture( &[ "good.wav" ] );
        let mut session = RecordingSession::default();

        let ( rc, text ) = run( dir.path(), &[ "--music", "gone.ogg", "good.wav" ], &mut session );
        assert_eq!( rc, 1 );
        assert_eq!( text, "File not found: gone.ogg\nPlaying sound: good.wav\n" );
    }


    #[test]
    fn test_playback_failure_does_not_stop_batch() {
        let dir = fixture( &[ "a.wav", "b.wav" ] );
        let mut session = RecordingSession {
            refuse: Some( dir.path().join( "a.wav" ) ),
            ..Default::default()
        };

        let ( rc, text ) = run( dir.path(), &[ "a.wav", "b.wav" ], &mut session );
        assert_eq!( rc, 1 );
        assert_eq!( text, "Failed to play: a.wav\nPlaying sound: b.wav\n" );
    }


    #[test]
    fn test_same_inputs_same_status() {
        let dir = fixture( &[ "good.wav" ] );
        let first = run( dir.path(), &[ "good.wav", "missing.wav" ], &mut RecordingSession::default() );
        let second = run( dir.path(), &[ "good.wav", "missing.wav" ], &mut RecordingSession::default() );
        assert_eq!( first, second );
    }


    #[test]
    fn test_no_files_prints_usage_without_playing() {
        let mut session = RecordingSession::default();
        let mut out = Vec::new();

        let code = run_invocation( Vec::new(), &mut session, &mut out );
        assert_eq!( code, 1 );
        assert_eq!( String::from_utf8( out ).unwrap(), format!( "{}\n", USAGE ) );
        assert!( session.played.is_empty() );
    }


    #[test]
    fn test_invocation_status_for_trailing_music_flag() {
        let mut session = RecordingSession::default();
        let mut out = Vec::new();

        let code = run_invocation( os( &[ "--music" ] ), &mut session, &mut out );
        assert_eq!( code, 1 );
    }


    #[test]
    fn test_exit_status_is_normalized() {
        assert_eq!( exit_status( 0 ), 0 );
        assert_eq!( exit_status( 1 ), 1 );
        assert_eq!( exit_status( 3 ), 1 );
    }
}
