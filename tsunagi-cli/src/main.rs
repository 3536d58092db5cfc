//! Tsunagi CLI - コマンドラインインターフェース
//!
//! ローカル端末でのデバッグ（`run`）と、TCP越しのリモートデバッグ
//! （`rdb server` / `rdb client`）を提供します。

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::process;
use tracing_subscriber::EnvFilter;
use tsunagi_core::{resolve_program, DebuggeeFailure, Debugger, Flow, Outcome, ProgramDebugger};
use tsunagi_remote::config::parse_seconds;
use tsunagi_remote::{Completion, RemoteClient, RemoteConfig, Session, SessionError, TransportError};

/// 接続が拒否されたときのクライアントの終了コード
const EXIT_CONNECTION_REFUSED: i32 = 2;

/// Tsunagi - line debugger that can be driven over TCP
#[derive(Parser)]
#[command(name = "tsunagi")]
#[command(version)]
#[command(about = "Line debugger that can be driven over a TCP connection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: TopCommand,
}

#[derive(Subcommand)]
enum TopCommand {
    /// Launch and debug an executable on this terminal
    Run {
        /// Look the program up in PATH
        #[arg(short = 'm')]
        search_path: bool,

        /// Path to the executable
        program: String,

        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Remote debugging over a TCP connection
    Rdb {
        #[command(subcommand)]
        command: RdbCommand,
    },
}

#[derive(Subcommand)]
enum RdbCommand {
    /// Wait for one client and debug a program on its behalf
    Server(ServerArgs),
    /// Connect to a waiting server
    Client(ClientArgs),
}

#[derive(Args)]
struct ServerArgs {
    /// Interface to listen on [env: TSUNAGI_RDB_BIND, default: 0.0.0.0]
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on [env: TSUNAGI_RDB_PORT, default: 8268]
    #[arg(long)]
    port: Option<u16>,

    /// Redirect the standard streams to the client
    #[arg(long, overrides_with = "no_patch_stdio")]
    patch_stdio: bool,

    /// Keep the standard streams on this terminal
    #[arg(long, overrides_with = "patch_stdio")]
    no_patch_stdio: bool,

    /// Give up if no client connects within SECS
    #[arg(long, value_name = "SECS")]
    accept_timeout: Option<String>,

    /// Command to run once the client is connected (repeatable)
    #[arg(short = 'c', long = "command", value_name = "CMD")]
    commands: Vec<String>,

    /// Look the program up in PATH
    #[arg(short = 'm')]
    search_path: bool,

    /// Program to debug
    program: String,

    /// Arguments to pass to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Args)]
struct ClientArgs {
    /// Server host [env: TSUNAGI_RDB_HOST, default: 127.0.0.1]
    #[arg(long)]
    host: Option<String>,

    /// Server port [env: TSUNAGI_RDB_PORT, default: 8268]
    #[arg(long)]
    port: Option<u16>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<String>,

    /// Edit each line locally (history, cursor keys) before sending it
    #[arg(long)]
    line_edit: bool,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let code = match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    process::exit(code);
}

/// ログの初期化（`RUST_LOG` で上書き可能）
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn run(command: TopCommand) -> Result<i32> {
    match command {
        TopCommand::Run {
            search_path,
            program,
            args,
        } => {
            let program = resolve_program(&program, search_path)?;
            let mut debugger = ProgramDebugger::new(program, args);
            run_repl(&mut debugger)
        }
        TopCommand::Rdb {
            command: RdbCommand::Server(args),
        } => run_server(args),
        TopCommand::Rdb {
            command: RdbCommand::Client(args),
        } => run_client(args),
    }
}

/// リモートのクライアントを待ち、接続上でプログラムをデバッグする
fn run_server(args: ServerArgs) -> Result<i32> {
    let mut config = RemoteConfig::from_env()?;
    if let Some(host) = args.host {
        config.bind_to = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.patch_stdio {
        config.patch_stdio = true;
    }
    if args.no_patch_stdio {
        config.patch_stdio = false;
    }
    if let Some(secs) = args.accept_timeout {
        config.accept_timeout = Some(parse_seconds("--accept-timeout", secs)?);
    }

    let program = resolve_program(&args.program, args.search_path)?;
    let mut debugger = ProgramDebugger::new(&program, args.args);

    let mut session = Session::listen(&config)?.with_commands(args.commands);
    if let Some(addr) = session.local_addr() {
        eprintln!("RemoteDebugger listening on {} for {}", addr, program.display());
    }
    session.accept()?;

    match session.run(&mut debugger) {
        Ok(completion) => Ok(completion_code(completion)),
        Err(SessionError::DebuggeeSignaled(signal)) => Ok(128 + signal as i32),
        Err(e) => Err(e.into()),
    }
}

/// サーバーに接続し、端末の入出力を中継する
fn run_client(args: ClientArgs) -> Result<i32> {
    let mut config = RemoteConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secs) = args.timeout {
        config.connect_timeout = Some(parse_seconds("--timeout", secs)?);
    }

    let client = match RemoteClient::connect(&config.host, config.port, config.connect_timeout) {
        Ok(client) => client,
        Err(e @ TransportError::ConnectionRefused(_)) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_CONNECTION_REFUSED);
        }
        Err(e) => return Err(e.into()),
    };

    let mut stdout = io::stdout();
    if args.line_edit {
        client.run_line_edit(&mut stdout)?;
    } else {
        client.run(io::stdin(), &mut stdout)?;
    }
    Ok(0)
}

/// REPLループを実行する
fn run_repl(debugger: &mut ProgramDebugger) -> Result<i32> {
    println!("Tsunagi - line debugger");
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut stdout = io::stdout();
    debugger.enter(&mut stdout)?;

    let mut rl = DefaultEditor::new()?;
    let mut last_command = String::new();

    let outcome = loop {
        let line = match rl.readline("(tsunagi) ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break quit(debugger, &mut stdout);
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break quit(debugger, &mut stdout);
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break quit(debugger, &mut stdout);
            }
        };

        let line = line.trim();
        if line.is_empty() && last_command.is_empty() {
            continue;
        }
        if !line.is_empty() {
            rl.add_history_entry(line)?;
            last_command = line.to_string();
        }

        match debugger.execute(&last_command, &mut stdout) {
            Ok(Flow::Stay) => {}
            Ok(Flow::Exit(outcome)) => break outcome,
            Err(e) => eprintln!("*** {:#}", e),
        }
        stdout.flush()?;
    };

    Ok(outcome_code(outcome))
}

/// 子プロセスを止めてREPLを抜ける
fn quit(debugger: &mut ProgramDebugger, output: &mut dyn Write) -> Outcome {
    match debugger.execute("quit", output) {
        Ok(Flow::Exit(outcome)) => outcome,
        Ok(Flow::Stay) => Outcome::Quit,
        Err(e) => {
            eprintln!("*** {:#}", e);
            Outcome::Quit
        }
    }
}

fn completion_code(completion: Completion) -> i32 {
    match completion {
        Completion::Exited(code) => code,
        Completion::Quit | Completion::Continue => 0,
    }
}

fn outcome_code(outcome: Outcome) -> i32 {
    match outcome {
        Outcome::Exited(code) => code,
        Outcome::Failed(DebuggeeFailure::Signaled(signal)) => 128 + signal as i32,
        Outcome::Failed(_) => 1,
        Outcome::Quit | Outcome::Continue => 0,
    }
}
