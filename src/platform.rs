//! Platform collaborators: socket bootstrap, readiness polling, the
//! system clock, and file mode twiddling.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::time::Duration;

/// Binds the listening socket on the IPv4 wildcard address with a backlog
/// of one. Only a single client is ever expected at a time.
#[cfg(unix)]
pub fn listen(port: u16) -> io::Result<TcpListener> {
    use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};

    use nix::sys::socket::{self, sockopt, AddressFamily, Backlog, SockFlag, SockType, SockaddrIn};

    let fd = socket::socket(
        AddressFamily::Inet,
        SockType::Stream,
        SockFlag::empty(),
        None,
    )
    .map_err(io::Error::from)?;
    socket::setsockopt(&fd, sockopt::ReuseAddr, &true).map_err(io::Error::from)?;
    let addr = SockaddrIn::new(0, 0, 0, 0, port);
    socket::bind(fd.as_raw_fd(), &addr).map_err(io::Error::from)?;
    let backlog = Backlog::new(1).map_err(io::Error::from)?;
    socket::listen(&fd, backlog).map_err(io::Error::from)?;
    // SAFETY: the fd is a freshly created socket we own; ownership moves
    // into the TcpListener.
    Ok(unsafe { TcpListener::from_raw_fd(fd.into_raw_fd()) })
}

#[cfg(not(unix))]
pub fn listen(port: u16) -> io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
}

/// Waits up to `timeout` for the client socket to become readable.
/// Returns true when data or an EOF is pending.
#[cfg(unix)]
pub fn wait_readable(stream: &TcpStream, timeout: Duration) -> io::Result<bool> {
    use std::os::fd::AsFd;

    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

    let mut fds = [PollFd::new(stream.as_fd(), PollFlags::POLLIN)];
    let millis = timeout.as_millis().min(u128::from(u16::MAX)) as u16;
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) => Ok(false),
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EINTR) => Ok(false),
        Err(errno) => Err(errno.into()),
    }
}

#[cfg(not(unix))]
pub fn wait_readable(_stream: &TcpStream, timeout: Duration) -> io::Result<bool> {
    std::thread::sleep(timeout);
    Ok(false)
}

/// Non-destructively checks whether the peer has closed the connection.
/// Ok(false) means data is pending or there is nothing to report.
#[cfg(unix)]
pub fn peer_closed(stream: &TcpStream) -> io::Result<bool> {
    use std::os::fd::AsRawFd;

    use nix::sys::socket::{recv, MsgFlags};

    let mut byte = [0u8; 1];
    match recv(
        stream.as_raw_fd(),
        &mut byte,
        MsgFlags::MSG_PEEK | MsgFlags::MSG_DONTWAIT,
    ) {
        Ok(0) => Ok(true),
        Ok(_) => Ok(false),
        Err(nix::errno::Errno::EAGAIN) => Ok(false),
        Err(errno) => Err(errno.into()),
    }
}

#[cfg(not(unix))]
pub fn peer_closed(stream: &TcpStream) -> io::Result<bool> {
    stream.set_nonblocking(true)?;
    let mut byte = [0u8; 1];
    let closed = match stream.peek(&mut byte) {
        Ok(0) => Ok(true),
        Ok(_) => Ok(false),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(err) => Err(err),
    };
    stream.set_nonblocking(false)?;
    closed
}

/// True when the clock already reads within `leeway` seconds of the
/// target, in which case setting it would only cause churn.
pub fn within_leeway(now: i64, epoch: u64, leeway: u32) -> bool {
    (i128::from(now) - i128::from(epoch)).abs() <= i128::from(leeway)
}

/// Sets the system clock to `epoch` seconds, unless it is already within
/// `leeway` seconds of it.
pub fn set_system_time(epoch: u64, leeway: u32) -> io::Result<()> {
    let now = chrono::Utc::now().timestamp();
    if within_leeway(now, epoch, leeway) {
        return Ok(());
    }
    set_clock(epoch)
}

#[cfg(unix)]
fn set_clock(epoch: u64) -> io::Result<()> {
    use nix::sys::time::TimeSpec;
    use nix::time::{clock_settime, ClockId};

    let ts = TimeSpec::new(epoch as libc::time_t, 0);
    clock_settime(ClockId::CLOCK_REALTIME, ts).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn set_clock(_epoch: u64) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "setting the clock is not supported on this platform",
    ))
}

/// Marks a received file as executable.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Builds the helper script that swaps the server binary once the old
/// process has exited: wait a beat for the listening socket to be
/// released, move the replacement into place, then relaunch with the
/// original arguments.
pub fn upgrade_script(replacement: &Path, server: &Path, args: &[String]) -> String {
    let mut script = String::from("#!/bin/sh\nsleep 1\n");
    script.push_str(&format!(
        "mv {} {}\n",
        shell_quote(&replacement.to_string_lossy()),
        shell_quote(&server.to_string_lossy()),
    ));
    script.push_str(&shell_quote(&server.to_string_lossy()));
    for arg in args {
        script.push(' ');
        script.push_str(&shell_quote(arg));
    }
    script.push('\n');
    script
}

/// Writes the upgrade script and marks it runnable.
pub fn write_upgrade_script(
    script_path: &Path,
    replacement: &Path,
    server: &Path,
    args: &[String],
) -> io::Result<()> {
    std::fs::write(script_path, upgrade_script(replacement, server, args))?;
    make_executable(script_path)
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}
