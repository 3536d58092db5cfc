//! 統合テスト共通のヘルパー

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tsunagi_remote::RemoteConfig;

/// 今は使われていないポート番号を取得する
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// ループバックでエフェメラルポートを使い、標準入出力は差し替えない設定
pub fn loopback_config() -> RemoteConfig {
    RemoteConfig::default()
        .with_bind_to("127.0.0.1")
        .with_host("127.0.0.1")
        .with_port(0)
        .with_patch_stdio(false)
}

/// サーバーが待ち受けを始めるまで接続を試みる
pub fn connect_with_retry(addr: SocketAddr) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("could not connect to {}: {}", addr, e),
        }
    }
}

/// 相手が閉じるまで読み続ける（リセットも終了として扱う）
pub fn read_until_closed(stream: &mut TcpStream) -> String {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}

/// 接続してコマンドを送り、サーバーが閉じるまでの出力を返すクライアント
///
/// コマンドを送り終えたら送信側を閉じるので、サーバーには入力の終端が見えます。
pub fn scripted_client(addr: SocketAddr, commands: &'static str) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut stream = connect_with_retry(addr);
        stream.write_all(commands.as_bytes()).unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
        read_until_closed(&mut stream)
    })
}
