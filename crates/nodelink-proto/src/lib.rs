//! Wire protocol for the repeater controller's management interface.
//!
//! The interface is line oriented: every message is a block of
//! `Key: Value` lines terminated by a blank line. This crate turns a byte
//! stream into classified messages and response bodies into typed data.
//! It owns no sockets and spawns no tasks.
//!
//! # Layers
//!
//! - [`frame`] -- pure frame decoding from a byte buffer
//! - [`reader`] -- [`FrameReader`], frames from any `AsyncRead`
//! - [`message`] -- [`classify`] a frame into an Event / Response / Unknown [`Message`]
//! - [`action`] -- outbound [`Action`] encoding
//! - [`xstat`], [`sawstat`], [`voter`], [`links`] -- best-effort body parsers

pub mod action;
pub mod block;
pub mod frame;
pub mod links;
pub mod message;
pub mod reader;
pub mod sawstat;
pub mod voter;
pub mod xstat;

pub use action::Action;
pub use block::{check_error, parse_flag};
pub use frame::{DecodeResult, Frame, MAX_FRAME_BYTES, decode_frame};
pub use links::{LinkList, LinkedNode, parse_linked_nodes, parse_rpt_alinks, parse_rpt_links};
pub use message::{Message, MessageKind, classify};
pub use reader::FrameReader;
pub use sawstat::{SawStat, parse_sawstat};
pub use voter::{Receiver, VoterSection, VoterStatus, parse_voter_status};
pub use xstat::{RX_KEYED_VAR, TX_KEYED_VAR, XStat, format_conn_line, format_xstat, parse_xstat};
