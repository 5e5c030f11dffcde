#![forbid(unsafe_code)]

//! Local HTTP relay in front of the `yt-dlp` extractor.
//!
//! Requests are compiled into a discrete argv ([`compiler`]), executed as a
//! child process ([`extractor`]), and their results either normalized for
//! display ([`metadata`]) or streamed back as a file ([`dispatch`]).

pub mod compiler;
pub mod config;
pub mod dispatch;
pub mod extractor;
pub mod metadata;
pub mod request;
pub mod server;
pub mod telemetry;
