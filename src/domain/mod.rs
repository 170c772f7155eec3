//! Domain types: keys, serials, subjects, profiles, revocation, OCSP and
//! RFC 3161 structures. Nothing in here performs I/O.

pub mod asn1_util;
pub mod audit;
pub mod constants;
pub mod crypto;
pub mod ocsp;
pub mod profile;
pub mod revocation;
pub mod serial;
pub mod subject;
pub mod tsp;
