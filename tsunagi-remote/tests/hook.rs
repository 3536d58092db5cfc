//! プロセス全体のブレークハンドラ
//!
//! ハンドラの登録先はプロセスに1つなので、このファイルのテストは1つだけです。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tsunagi_core::Frame;
use tsunagi_remote::{
    breakpoint, install, install_handler, is_installed, uninstall, BreakHandler, Completion,
    RemoteConfig,
};

fn counting_handler(calls: Arc<AtomicUsize>, completion: Completion) -> BreakHandler {
    Arc::new(move |_frame| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(completion)
    })
}

#[test]
fn install_replace_and_uninstall() {
    assert!(!is_installed());
    assert!(!uninstall(), "uninstall without install is a no-op");

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    install_handler(counting_handler(first.clone(), Completion::Continue));
    assert!(is_installed());
    assert_eq!(breakpoint().unwrap(), Completion::Continue);
    assert_eq!(first.load(Ordering::SeqCst), 1);

    // 二重のインストールは置き換えになり、アンインストールで元に戻る
    install_handler(counting_handler(second.clone(), Completion::Quit));
    assert_eq!(breakpoint().unwrap(), Completion::Quit);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    assert!(uninstall());
    assert!(!is_installed());
    assert!(!uninstall());

    // ハンドラにはマクロの呼び出し位置と変数が渡される
    let seen: Arc<Mutex<Option<Frame>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    install_handler(Arc::new(move |frame| {
        // ハンドラの中からでも登録状態を参照できる
        assert!(is_installed());
        *sink.lock().unwrap() = Some(frame);
        Ok(Completion::Continue)
    }));
    let attempts = 3;
    let label = "retry";
    let line = line!() + 1;
    tsunagi_remote::breakpoint!(attempts, label).unwrap();
    assert!(uninstall());

    let frame = seen.lock().unwrap().take().unwrap();
    assert!(frame.file.ends_with("hook.rs"), "{}", frame.file);
    assert_eq!(frame.line, line);
    assert_eq!(frame.module.as_deref(), Some(module_path!()));
    assert_eq!(frame.local("attempts"), Some("3"));
    assert_eq!(frame.local("label"), Some("\"retry\""));

    // リモートハンドラのインストール（ブレークはしない）
    install(RemoteConfig::default().with_port(0));
    assert!(is_installed());
    assert!(uninstall());
    assert!(!is_installed());
}
