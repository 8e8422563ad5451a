//! Unit tests for the FTP session, run against a scripted loopback server.

use super::*;
use rstest::rstest;
use sitedrop::config::Password;
use sitedrop::names::RemoteDir;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

/// How the scripted server answers one command.
enum Reply {
    /// A single control-channel line.
    Say(&'static str),
    /// `150`, the lines over the data channel, then `226`.
    Listing(Vec<&'static str>),
    /// `150`, drain the data channel, then `226`.
    Receive,
    /// `150`, accept the data channel, then go quiet.
    StallData,
    /// Never answer.
    Silence,
}

const QUIET_PERIOD: Duration = Duration::from_secs(6);

/// One-connection FTP server that handles login and `PASV` itself and
/// defers every other command to a script.
struct ScriptedServer {
    address: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedServer {
    fn start(script: impl Fn(&str, &str) -> Reply + Send + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind control");
        let address = listener.local_addr().expect("control address");
        let commands = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&commands);
        thread::spawn(move || serve(&listener, &script, &log));
        Self { address, commands }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("command log").clone()
    }

    fn connect(&self) -> FtpSession {
        FtpSession::connect(&endpoint(self.address.port()), &timeouts())
            .expect("login to scripted server")
    }
}

fn serve(
    listener: &TcpListener,
    script: &dyn Fn(&str, &str) -> Reply,
    log: &Mutex<Vec<String>>,
) {
    let Ok((control, _)) = listener.accept() else {
        return;
    };
    let mut out = control.try_clone().expect("clone control");
    let mut input = BufReader::new(control);
    let mut say = |line: &str| {
        let _ = write!(out, "{line}\r\n");
    };
    say("220 scripted server ready");

    let mut passive: Option<TcpListener> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let command = line.trim_end();
        let (verb, argument) = command.split_once(' ').unwrap_or((command, ""));
        log.lock().expect("command log").push(command.to_owned());

        match verb {
            "USER" => say("331 password required"),
            "PASS" => say("230 logged in"),
            "TYPE" => say("200 type set"),
            "QUIT" => {
                say("221 goodbye");
                return;
            }
            "PASV" => {
                let data = TcpListener::bind("127.0.0.1:0").expect("bind data");
                let port = data.local_addr().expect("data address").port();
                say(&format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})",
                    port / 256,
                    port % 256
                ));
                passive = Some(data);
            }
            _ => match script(verb, argument) {
                Reply::Say(text) => say(text),
                Reply::Listing(lines) => {
                    say("150 opening data connection");
                    let (mut data, _) = accept_data(&mut passive);
                    for entry in lines {
                        let _ = write!(data, "{entry}\r\n");
                    }
                    drop(data);
                    say("226 transfer complete");
                }
                Reply::Receive => {
                    say("150 ready to receive");
                    let (mut data, _) = accept_data(&mut passive);
                    let mut sink = Vec::new();
                    let _ = data.read_to_end(&mut sink);
                    say("226 transfer complete");
                }
                Reply::StallData => {
                    say("150 opening data connection");
                    let _held = accept_data(&mut passive);
                    thread::sleep(QUIET_PERIOD);
                    return;
                }
                Reply::Silence => {
                    thread::sleep(QUIET_PERIOD);
                    return;
                }
            },
        }
    }
}

fn accept_data(passive: &mut Option<TcpListener>) -> (TcpStream, SocketAddr) {
    passive
        .take()
        .expect("PASV before data command")
        .accept()
        .expect("accept data")
}

fn endpoint(port: u16) -> RemoteEndpoint {
    RemoteEndpoint {
        host: "127.0.0.1".to_owned(),
        port,
        user: "deploy".to_owned(),
        password: Password::new("secret"),
        security: TransportSecurity::Plain,
        base_path: RemoteDir::try_from("/site/").expect("valid remote dir"),
    }
}

fn timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(2),
        transfer: Duration::from_secs(1),
        trigger: Duration::from_secs(1),
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[test]
fn parses_mlsd_lines_and_skips_dot_entries() {
    let lines = vec![
        "type=cdir;modify=20240101000000; .".to_owned(),
        "type=pdir;modify=20240101000000; ..".to_owned(),
        "type=file;size=12;modify=20240101000000; index.html".to_owned(),
        "type=dir;modify=20240101000000; _next".to_owned(),
    ];
    let entries = parse_lines(&lines, ListedFile::from_mlsx_line);
    assert_eq!(
        entries,
        vec![RemoteEntry::file("index.html"), RemoteEntry::directory("_next")]
    );
}

#[test]
fn parses_unix_list_lines() {
    let lines = vec![
        "-rw-r--r-- 1 deploy deploy 12 Jan 01 00:00 index.html".to_owned(),
        "drwxr-xr-x 2 deploy deploy 4096 Jan 01 00:00 assets".to_owned(),
        "garbage".to_owned(),
    ];
    let entries = parse_lines(&lines, |line| ListedFile::try_from(line));
    assert_eq!(
        entries,
        vec![RemoteEntry::file("index.html"), RemoteEntry::directory("assets")]
    );
}

#[test]
fn missing_directory_lists_as_none() {
    let server = ScriptedServer::start(|verb, _| match verb {
        "CWD" => Reply::Say("550 no such directory"),
        _ => Reply::Say("502 not scripted"),
    });
    let mut session = server.connect();
    assert_eq!(session.list_directory("/site").expect("list"), None);
}

#[test]
fn refused_directory_change_is_an_error() {
    let server = ScriptedServer::start(|verb, _| match verb {
        "CWD" => Reply::Say("530 not permitted"),
        _ => Reply::Say("502 not scripted"),
    });
    let mut session = server.connect();
    let err = session.list_directory("/site").expect_err("530 is not absence");
    assert!(
        matches!(
            err,
            TransferError::Rejected {
                operation: RemoteOperation::List,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn unanswered_directory_change_times_out() {
    let server = ScriptedServer::start(|verb, _| match verb {
        "CWD" => Reply::Silence,
        _ => Reply::Say("502 not scripted"),
    });
    let mut session = server.connect();
    let err = session.list_directory("/site").expect_err("no reply");
    assert!(matches!(err, TransferError::Timeout { .. }), "{err:?}");
}

#[test]
fn stalled_listing_data_channel_times_out() {
    let server = ScriptedServer::start(|verb, _| match verb {
        "CWD" => Reply::Say("250 directory changed"),
        "MLSD" => Reply::StallData,
        _ => Reply::Say("502 not scripted"),
    });
    let mut session = server.connect();
    let started = Instant::now();
    let err = session.list_directory("/site").expect_err("stalled");
    assert!(
        started.elapsed() < QUIET_PERIOD - Duration::from_secs(2),
        "listing waited {:?}",
        started.elapsed()
    );
    assert!(matches!(err, TransferError::Timeout { .. }), "{err:?}");
}

// ---------------------------------------------------------------------------
// Clearing
// ---------------------------------------------------------------------------

#[test]
fn clear_surfaces_refused_delete() {
    let server = ScriptedServer::start(|verb, _| match verb {
        "CWD" => Reply::Say("250 directory changed"),
        "MLSD" => Reply::Listing(vec!["type=file;size=3; index.html"]),
        "DELE" => Reply::Say("550 permission denied"),
        _ => Reply::Say("502 not scripted"),
    });
    let mut session = server.connect();
    let err = session.clear_directory("/site").expect_err("DELE refused");
    match err {
        TransferError::Rejected {
            operation, path, ..
        } => {
            assert_eq!(operation, RemoteOperation::Delete);
            assert_eq!(path, "/site/index.html");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn clearing_an_empty_directory_is_repeatable() {
    let server = ScriptedServer::start(|verb, _| match verb {
        "CWD" => Reply::Say("250 directory changed"),
        "MLSD" => Reply::Listing(Vec::new()),
        _ => Reply::Say("502 not scripted"),
    });
    let mut session = server.connect();
    session.clear_directory("/site").expect("first clear");
    session.clear_directory("/site").expect("second clear");
    assert!(
        !server
            .commands()
            .iter()
            .any(|c| c.starts_with("DELE") || c.starts_with("RMD"))
    );
}

#[test]
fn clear_removes_nested_directories_bottom_up() {
    let server = ScriptedServer::start(|verb, argument| match (verb, argument) {
        ("CWD", _) => Reply::Say("250 directory changed"),
        ("MLSD", "/site") => Reply::Listing(vec!["type=dir; assets", "type=file;size=1; a"]),
        ("MLSD", "/site/assets") => Reply::Listing(vec!["type=file;size=1; app.css"]),
        ("DELE" | "RMD", _) => Reply::Say("250 removed"),
        _ => Reply::Say("502 not scripted"),
    });
    let mut session = server.connect();
    session.clear_directory("/site").expect("clear");

    let removals: Vec<String> = server
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("DELE") || c.starts_with("RMD"))
        .collect();
    assert_eq!(
        removals,
        vec![
            "DELE /site/assets/app.css",
            "RMD /site/assets",
            "DELE /site/a",
        ]
    );
}

// ---------------------------------------------------------------------------
// Uploading
// ---------------------------------------------------------------------------

#[rstest]
#[case::size_matches("213 5", true)]
#[case::size_short("213 2", false)]
fn upload_creates_parents_and_verifies_size(
    #[case] size_reply: &'static str,
    #[case] ok: bool,
) {
    let server = ScriptedServer::start(move |verb, argument| match (verb, argument) {
        ("CWD", "/site/assets") => Reply::Say("550 no such directory"),
        ("CWD", _) => Reply::Say("250 directory changed"),
        ("MKD", _) => Reply::Say("257 created"),
        ("STOR", _) => Reply::Receive,
        ("SIZE", _) => Reply::Say(size_reply),
        _ => Reply::Say("502 not scripted"),
    });
    let dir = tempfile::tempdir().expect("temp dir");
    let local = dir.path().join("app.css");
    fs::write(&local, b"hello").expect("write local file");

    let mut session = server.connect();
    let result = session.upload_file(&local, "/site/assets/app.css");

    if ok {
        assert_eq!(result.expect("upload"), 5);
    } else {
        assert!(
            matches!(
                result,
                Err(TransferError::Incomplete {
                    stored: 2,
                    expected: 5,
                    ..
                })
            ),
            "{result:?}"
        );
    }
    let commands = server.commands();
    assert!(commands.contains(&"MKD /site/assets".to_owned()), "{commands:?}");
    assert!(commands.contains(&"STOR /site/assets/app.css".to_owned()));
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[rstest]
#[case::timed_out(io::ErrorKind::TimedOut, true)]
#[case::would_block(io::ErrorKind::WouldBlock, true)]
#[case::refused(io::ErrorKind::ConnectionRefused, false)]
fn classifies_timeouts(#[case] kind: io::ErrorKind, #[case] expected: bool) {
    assert_eq!(is_timeout(&io::Error::from(kind)), expected);
}

#[test]
fn io_timeout_on_command_maps_to_transfer_timeout() {
    let err = rejected(
        RemoteOperation::Upload,
        "/site/app.zip",
        FtpError::ConnectionError(io::Error::from(io::ErrorKind::TimedOut)),
    );
    assert!(matches!(err, TransferError::Timeout { .. }));
}

#[test]
fn unresolvable_host_is_unreachable() {
    let err = resolve("no-such-host.invalid:21").expect_err("must not resolve");
    assert!(matches!(err, ConnectionError::Unreachable { .. }));
}
