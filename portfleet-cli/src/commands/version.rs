//! Version subcommand implementation

pub fn run() {
    println!("portfleet {}", env!("CARGO_PKG_VERSION"));
    println!("axum-based listeners, tokio runtime");

    #[cfg(target_os = "linux")]
    println!("target: linux");
    #[cfg(target_os = "macos")]
    println!("target: macos");
    #[cfg(target_os = "windows")]
    println!("target: windows");
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    println!("target: unknown");
}
