//! End-to-end tests at the HTTP request/response level.
//!
//! Each test file covers a specific scenario, driving the full router with
//! a deterministic clock and fixture keys.

#![cfg(test)]

mod helpers;

mod test_invite_expiry;
mod test_invites;
mod test_jwks;
mod test_login_assertion;
mod test_login_replay;
mod test_logout;
mod test_register_flow;
mod test_unauthenticated;
