//! Service manager notifications (`sd_notify` datagram protocol).
//!
//! When `NOTIFY_SOCKET` is unset every call is a no-op, so the binary runs
//! the same under systemd and from a shell.

use std::env;
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::net::UnixDatagram;

pub const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Sends `READY=1`, `WATCHDOG=1` and `STOPPING=1` to the service manager.
#[derive(Debug)]
pub struct Notifier {
    target: Option<PathBuf>,
    #[cfg(unix)]
    socket: Option<UnixDatagram>,
}

impl Notifier {
    /// Notifier for the socket named by `NOTIFY_SOCKET`, if any.
    pub fn from_env() -> Self { Self::new(env::var_os(NOTIFY_SOCKET_ENV).map(PathBuf::from)) }

    pub fn disabled() -> Self { Self::new(None) }

    pub fn new(target: Option<PathBuf>) -> Self {
        #[cfg(unix)]
        let socket = target.as_ref().and_then(|_| match UnixDatagram::unbound() {
            Ok(socket) => Some(socket),
            Err(e) => {
                tracing::warn!(error = %e, "notify socket could not be created");
                None
            }
        });
        Self {
            target,
            #[cfg(unix)]
            socket,
        }
    }

    #[inline]
    pub const fn is_enabled(&self) -> bool { self.target.is_some() }

    pub fn ready(&self) -> bool { self.send("READY=1") }

    pub fn watchdog(&self) -> bool { self.send("WATCHDOG=1") }

    pub fn stopping(&self) -> bool { self.send("STOPPING=1") }

    /// Free-form status line shown by `systemctl status`.
    pub fn status(
        &self,
        status: &str,
    ) -> bool {
        self.send(&format!("STATUS={status}"))
    }

    #[cfg(unix)]
    fn send(
        &self,
        message: &str,
    ) -> bool {
        let (Some(target), Some(socket)) = (&self.target, &self.socket) else {
            return false;
        };
        let sent = match abstract_name(target) {
            #[cfg(target_os = "linux")]
            Some(name) => send_abstract(socket, name, message),
            #[cfg(not(target_os = "linux"))]
            Some(_) => Err(std::io::Error::from(std::io::ErrorKind::Unsupported)),
            None => socket.send_to(message.as_bytes(), target).map(|_| ()),
        };
        match sent {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, payload = message, "notify failed");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn send(
        &self,
        _message: &str,
    ) -> bool {
        false
    }
}

/// Name of an abstract socket address (`@name`), if `target` is one.
#[cfg(unix)]
fn abstract_name(target: &std::path::Path) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;

    target.as_os_str().as_bytes().strip_prefix(b"@")
}

#[cfg(target_os = "linux")]
fn send_abstract(
    socket: &UnixDatagram,
    name: &[u8],
    message: &str,
) -> std::io::Result<()> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    let addr = SocketAddr::from_abstract_name(name)?;
    socket.send_to_addr(message.as_bytes(), &addr).map(|_| ())
}
