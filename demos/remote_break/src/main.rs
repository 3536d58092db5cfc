//! リモートブレークのサンプルプログラム
//!
//! 起動するとフックをインストールし、`compute` の途中でブレークして
//! クライアントの接続を待ちます。別の端末から次のように接続します。
//!
//! ```text
//! tsunagi rdb client --port 8268
//! ```

use anyhow::Result;
use tsunagi_remote::{Completion, RemoteConfig};

/// 数値を2倍にする
fn double(x: i32) -> i32 {
    println!("double({}) called", x);
    x * 2
}

/// 2つの値を加算する
fn add(a: i32, b: i32) -> i32 {
    println!("add({}, {}) called", a, b);
    a + b
}

/// オペレータが `quit` した場合は `None` を返す
fn compute(x: i32, y: i32) -> Result<Option<i32>> {
    let doubled_x = double(x);
    let doubled_y = double(y);

    // ここでリモートのオペレータに制御を渡す
    match tsunagi_remote::breakpoint!(x, y, doubled_x, doubled_y)? {
        Completion::Quit => return Ok(None),
        Completion::Continue | Completion::Exited(_) => {}
    }

    Ok(Some(add(doubled_x, doubled_y)))
}

fn main() -> Result<()> {
    tsunagi_remote::install(RemoteConfig::from_env()?);
    let result = compute(5, 10);
    tsunagi_remote::uninstall();

    match result? {
        Some(value) => {
            println!("compute(5, 10) = {}", value);
            println!("done");
        }
        None => println!("quit at breakpoint"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // フックはプロセス全体で共有されるので、1つのテストにまとめる
    #[test]
    fn test_compute_honours_operator_choice() {
        tsunagi_remote::install_handler(Arc::new(|_| Ok(Completion::Quit)));
        let quit = compute(5, 10).unwrap();

        tsunagi_remote::install_handler(Arc::new(|frame| {
            assert_eq!(frame.local("doubled_x"), Some("10"));
            assert_eq!(frame.local("doubled_y"), Some("20"));
            Ok(Completion::Continue)
        }));
        let continued = compute(5, 10).unwrap();
        tsunagi_remote::uninstall();

        assert_eq!(quit, None);
        assert_eq!(continued, Some(30));
    }
}
