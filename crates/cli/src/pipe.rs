// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows named-pipe transport backing [`PipeListener`]/[`PipeConnector`]
//! (spec §4.2, §4.3, §6).
//!
//! The front pipe grants full control to the current user and read/write to
//! Everyone, so any client in the same interactive session can connect
//! regardless of how it was launched (spec §6). The ACL is built once from a
//! literal SDDL string through `windows-sys`
//! (`ConvertStringSecurityDescriptorToSecurityDescriptorW`), grounded in the
//! same technique the `wojtek-psmux`/`arndawg-zellij-windows` examples use
//! for named-pipe security descriptors, typed through a real crate instead
//! of hand-rolled `#[link]` externs (SPEC_FULL.md §D.5).

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::AsRawHandle;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, PipeMode, ServerOptions};
use windows_sys::Win32::Foundation::{ERROR_PIPE_BUSY, HANDLE};
use windows_sys::Win32::Security::Authorization::ConvertStringSecurityDescriptorToSecurityDescriptorW;
use windows_sys::Win32::Security::{PSECURITY_DESCRIPTOR, SECURITY_ATTRIBUTES};
use windows_sys::Win32::System::Memory::LocalFree;
use windows_sys::Win32::System::Pipes::GetNamedPipeClientProcessId;

use agentmux_core::{AgentStream, PeerContext, PipeConnector, PipeListener};

/// Windows caps a pipe at this many simultaneous instances when none is
/// requested explicitly (`PIPE_UNLIMITED_INSTANCES`); we ask for it
/// outright since the front pipe must serve an arbitrary number of clients
/// (spec §4.3).
const PIPE_UNLIMITED_INSTANCES: usize = 255;

const PIPE_SDDL: &str = "D:(A;;GA;;;CO)(A;;GRGW;;;WD)";

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

/// Owns the security descriptor every pipe instance is created with. Freed
/// on drop via `LocalFree`, the deallocator `ConvertStringSecurityDescriptorTo...`
/// documents as the matching one.
struct SecurityDescriptor(PSECURITY_DESCRIPTOR);

// The descriptor is an opaque heap block with no interior mutability;
// sharing the pointer across the listener's accept loop is safe.
unsafe impl Send for SecurityDescriptor {}
unsafe impl Sync for SecurityDescriptor {}

impl SecurityDescriptor {
    fn from_sddl(sddl: &str) -> io::Result<Self> {
        let wide = to_wide(sddl);
        let mut ptr: PSECURITY_DESCRIPTOR = std::ptr::null_mut();
        #[allow(unsafe_code)]
        // SAFETY: `wide` is NUL-terminated and lives for the call; `ptr` is
        // only ever written by the API.
        let ok = unsafe {
            ConvertStringSecurityDescriptorToSecurityDescriptorW(wide.as_ptr(), 1, &mut ptr, std::ptr::null_mut())
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self(ptr))
    }

    fn attributes(&self) -> SECURITY_ATTRIBUTES {
        SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: self.0,
            bInheritHandle: 0,
        }
    }
}

impl Drop for SecurityDescriptor {
    fn drop(&mut self) {
        if !self.0.is_null() {
            #[allow(unsafe_code)]
            // SAFETY: `self.0` was allocated by
            // `ConvertStringSecurityDescriptorToSecurityDescriptorW`, which
            // documents `LocalFree` as its deallocator.
            unsafe {
                LocalFree(self.0 as _);
            }
        }
    }
}

fn create_instance(addr: &str, security: &SecurityDescriptor, first: bool) -> io::Result<NamedPipeServer> {
    let mut attrs = security.attributes();
    #[allow(unsafe_code)]
    // SAFETY: `attrs.lpSecurityDescriptor` points at `security`, which
    // outlives every instance created from it; the struct is stack-local
    // and valid only for this call, which is all the API requires.
    unsafe {
        ServerOptions::new()
            .access_inbound(true)
            .access_outbound(true)
            .pipe_mode(PipeMode::Byte)
            .first_pipe_instance(first)
            .max_instances(PIPE_UNLIMITED_INSTANCES)
            .create_with_security_attributes_raw(addr, &mut attrs as *mut _ as *mut _)
    }
}

fn client_process_id(server: &NamedPipeServer) -> Option<u32> {
    let handle = server.as_raw_handle() as HANDLE;
    let mut pid: u32 = 0;
    #[allow(unsafe_code)]
    // SAFETY: `handle` is a valid, currently-open named-pipe server handle
    // owned by `server` for the duration of this call.
    let ok = unsafe { GetNamedPipeClientProcessId(handle, &mut pid) };
    (ok != 0).then_some(pid)
}

/// Accepts connections on the front pipe (spec §4.3). Keeps one spare pipe
/// instance created ahead of the next `accept()` call so a burst of
/// simultaneous connect attempts never finds the name temporarily absent.
pub struct WindowsPipeListener {
    addr: String,
    security: SecurityDescriptor,
    next: Option<NamedPipeServer>,
}

impl WindowsPipeListener {
    pub fn bind(pipe_name: &str) -> io::Result<Self> {
        let security = SecurityDescriptor::from_sddl(PIPE_SDDL)?;
        let addr = format!(r"\\.\pipe\{pipe_name}");
        let first = create_instance(&addr, &security, true)?;
        Ok(Self { addr, security, next: Some(first) })
    }
}

#[async_trait]
impl PipeListener for WindowsPipeListener {
    async fn accept(&mut self) -> io::Result<(Box<dyn AgentStream>, PeerContext)> {
        let server =
            self.next.take().ok_or_else(|| io::Error::other("pipe listener has no prepared instance"))?;
        server.connect().await?;
        self.next = Some(create_instance(&self.addr, &self.security, false)?);
        let peer = PeerContext { peer_pid: client_process_id(&server) };
        Ok((Box::new(server), peer))
    }
}

/// Connects to the shared backend pipe on demand (spec §4.2). Retries while
/// the pipe reports `ERROR_PIPE_BUSY` (another client mid-connect) until
/// `timeout` elapses.
pub struct WindowsPipeConnector;

#[async_trait]
impl PipeConnector for WindowsPipeConnector {
    async fn connect(&self, pipe_name: &str, timeout: Duration) -> io::Result<Box<dyn AgentStream>> {
        let addr = format!(r"\\.\pipe\{pipe_name}");
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match ClientOptions::new().open(&addr) {
                Ok(client) => return Ok(Box::new(client)),
                Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(err);
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
