//! Process signals the launcher reacts to
//!
//! Each listener is registered once and buffers deliveries, so a signal
//! that arrives while the caller is busy is still seen on the next `recv`.

#[cfg(unix)]
mod imp {
    use std::io;

    use tokio::signal::unix::{signal, Signal, SignalKind};

    pub struct Listener(Signal);

    impl Listener {
        /// Ctrl+C
        pub fn interrupt() -> io::Result<Self> {
            signal(SignalKind::interrupt()).map(Self)
        }

        /// SIGHUP: reload the config and restart
        pub fn reload() -> io::Result<Self> {
            signal(SignalKind::hangup()).map(Self)
        }

        /// SIGUSR1: check the server endpoint now
        pub fn refresh() -> io::Result<Self> {
            signal(SignalKind::user_defined1()).map(Self)
        }

        pub async fn recv(&mut self) {
            if self.0.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::io;

    use tokio::signal::windows::{ctrl_c, CtrlC};

    pub enum Listener {
        CtrlC(CtrlC),
        Never,
    }

    impl Listener {
        pub fn interrupt() -> io::Result<Self> {
            ctrl_c().map(Listener::CtrlC)
        }

        pub fn reload() -> io::Result<Self> {
            Ok(Listener::Never)
        }

        pub fn refresh() -> io::Result<Self> {
            Ok(Listener::Never)
        }

        pub async fn recv(&mut self) {
            match self {
                Listener::CtrlC(signal) => {
                    if signal.recv().await.is_none() {
                        std::future::pending::<()>().await;
                    }
                }
                Listener::Never => std::future::pending::<()>().await,
            }
        }
    }
}

pub use imp::Listener;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn send(signal: &str) {
        let status = std::process::Command::new("kill")
            .args([signal, &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_interrupt_while_busy_is_kept() {
        let mut interrupt = Listener::interrupt().unwrap();

        // Nobody is waiting on the listener when the signal lands.
        send("-INT");
        tokio::time::sleep(Duration::from_millis(200)).await;

        tokio::time::timeout(Duration::from_secs(5), interrupt.recv())
            .await
            .expect("interrupt was lost");
    }

    #[tokio::test]
    async fn test_refresh_signal_is_received() {
        let mut refresh = Listener::refresh().unwrap();
        send("-USR1");

        tokio::time::timeout(Duration::from_secs(5), refresh.recv())
            .await
            .expect("refresh signal was lost");
    }
}
