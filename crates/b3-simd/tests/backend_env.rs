//! Backend selection through the environment.
//!
//! Kept in its own test binary: it mutates the process environment, which
//! must not race with other threads reading it.

use b3_simd::dispatcher::Dispatcher;
use b3_simd::{BACKEND_ENV, Backend};

#[test]
fn detect_reads_backend_from_environment() {
    let detected = Backend::available()[0];

    // SAFETY: this is the only test in this binary, so no other thread
    // touches the environment concurrently.
    unsafe { std::env::set_var(BACKEND_ENV, "Portable") };
    assert_eq!(Dispatcher::detect().backend(), Backend::Portable);

    for backend in Backend::available() {
        unsafe { std::env::set_var(BACKEND_ENV, backend.name()) };
        assert_eq!(Dispatcher::detect().backend(), backend);
    }

    unsafe { std::env::set_var(BACKEND_ENV, "no-such-backend") };
    assert_eq!(Dispatcher::detect().backend(), detected);

    unsafe { std::env::remove_var(BACKEND_ENV) };
    assert_eq!(Dispatcher::detect().backend(), detected);
}
