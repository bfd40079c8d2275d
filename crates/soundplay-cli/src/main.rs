//! sound_play - play sound and music files from the command line

mod cli;
mod dispatch;

use std::ffi::OsString;
use std::io::{ self, Write };
use std::process::ExitCode;

use anyhow::{ Context, Result };
use tracing_subscriber::EnvFilter;

use cli::Args;
use soundplay_core::{ AudioSession, MixerConfig, MixerSession, SessionError };


/// Logs go to stderr so stdout carries only the status lines.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new( "warn" ) );
    let _ = tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_writer( io::stderr )
        .try_init();
}


/// Opens a session with `init`, plays `files` through it and closes it.
fn run<S, F>( init: F, files: Vec<OsString>, out: &mut dyn Write ) -> Result<u8>
where
    S: AudioSession,
    F: FnOnce() -> Result<S, SessionError>,
{
    let mut session = init().context( "Error initializing mixer" )?;

    let code = dispatch::run_invocation( files, &mut session, out );
    session.finalize();

    Ok( code )
}


/// Turns the outcome of [`run`] into an exit status, printing any error.
fn report( result: Result<u8>, out: &mut dyn Write ) -> u8 {
    match result {
        Ok( code ) => code,
        Err( e ) => {
            let _ = writeln!( out, "{:#}", e );
            1
        }
    }
}


fn main() -> ExitCode {
    init_logging();

    let args = match Args::try_parse_argv( std::env::args_os() ) {
        Ok( args ) => args,
        Err( e ) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = io::stdout().lock();
    let result = run( || MixerSession::init( MixerConfig::default() ), args.files, &mut stdout );

    ExitCode::from( report( result, &mut stdout ) )
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::Path;
    use std::rc::Rc;
    use std::time::Duration;

    use soundplay_core::output::OutputError;
    use soundplay_core::{ MixerError, PlayError, PlaybackKind, Playing };


    struct Done;

    impl Playing for Done {
        fn is_busy( &self ) -> bool {
            false
        }
    }


    /// Session that plays nothing and records whether it was closed.
    struct SilentSession {
        closed: Rc<Cell<bool>>,
    }

    impl AudioSession for SilentSession {
        type Handle = Done;

        fn start_sound( &mut self, _path: &Path ) -> Result<Done, PlayError> {
            Ok( Done )
        }

        fn start_music( &mut self, _path: &Path ) -> Result<Done, PlayError> {
            Ok( Done )
        }

        fn poll_interval( &self, _kind: PlaybackKind ) -> Duration {
            Duration::ZERO
        }

        fn finalize( self ) {
            self.closed.set( true );
        }
    }


    #[test]
    fn test_device_init_error_is_reported_and_nothing_plays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "good.wav" );
        std::fs::write( &path, b"" ).unwrap();

        let mut out = Vec::new();
        let result = run(
            || Err::<SilentSession, _>( SessionError::DeviceInit( MixerError::Output( OutputError::NoDevice ) ) ),
            vec![ path.into_os_string() ],
            &mut out,
        );
        let code = report( result, &mut out );

        assert_eq!( code, 1 );
        assert_eq!( String::from_utf8( out ).unwrap(), "Error initializing mixer: No output device available\n" );
    }


    #[test]
    fn test_session_is_finalized_after_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "good.wav" );
        std::fs::write( &path, b"" ).unwrap();

        let closed = Rc::new( Cell::new( false ) );
        let session = SilentSession { closed: Rc::clone( &closed ) };

        let mut out = Vec::new();
        let result = run( || Ok( session ), vec![ path.into_os_string() ], &mut out );

        assert_eq!( report( result, &mut out ), 0 );
        assert!( closed.get() );
    }


    #[test]
    fn test_usage_still_finalizes_session() {
        let closed = Rc::new( Cell::new( false ) );
        let session = SilentSession { closed: Rc::clone( &closed ) };

        let mut out = Vec::new();
        let code = report( run( || Ok( session ), Vec::new(), &mut out ), &mut out );

        assert_eq!( code, 1 );
        assert_eq!( String::from_utf8( out ).unwrap(), format!( "{}\n", cli::USAGE ) );
        assert!( closed.get() );
    }
}
