// Life of a request:
// 1. Middleware pulls the token from the session cookie or the
//    `Authorization` header
// 2. The token codec picks the verification key by `kid` and checks the
//    signature, expiry and audience
// 3. The session service loads the identity and hands the session to the
//    handler
//
// Login and registration:
//  - The caller presents an ID token from a trusted upstream issuer; the
//    credential and nonce are read from its verified claims
//  - Invite code is redeemed exactly once, within its expiry
//  - Identity and credential are created in the invite's tenant
//  - Login nonce is recorded, then a session cookie is issued
//  - A failure after redemption removes the identity and releases the invite
//
// System components:
//  - Key store (generated, file or remote JWKS)
//  - Token codec and session service
//  - Invite, login and registration services over the storage traits

pub mod assertion;
pub mod config;
pub mod ids;
pub mod invite;
pub mod keys;
pub mod login;
pub mod middleware;
pub mod notify;
pub mod registration;
pub mod routes;
pub mod session;
pub mod storage;
pub mod time;
pub mod token;

#[cfg(test)]
mod e2e_tests;
