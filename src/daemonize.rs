//! Host-process daemonization: fork, setsid, chdir to /, stdio to
//! /dev/null. Must run before the async runtime starts; forking a
//! multithreaded process is not safe.

use crate::Result;
use miette::IntoDiagnostic;
use nix::unistd::{ForkResult, fork, setsid};

pub fn daemonize() -> Result<()> {
    match unsafe { fork() }.into_diagnostic()? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }
    setsid().into_diagnostic()?;
    std::env::set_current_dir("/").into_diagnostic()?;
    unsafe {
        libc::umask(0o22);
    }
    redirect_stdio_to_devnull().into_diagnostic()?;
    Ok(())
}

fn redirect_stdio_to_devnull() -> std::io::Result<()> {
    unsafe {
        let fd = libc::open(c"/dev/null".as_ptr(), libc::O_RDWR);
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(fd, target) < 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
        if fd > libc::STDERR_FILENO {
            libc::close(fd);
        }
    }
    Ok(())
}
