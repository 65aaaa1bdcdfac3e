//! Protocol module

#![allow(missing_docs)]

pub mod body;
pub mod http;
pub mod plist;
