//! APRS-IS line protocol helpers.
//!
//! APRS-IS is plain ASCII text, one message per line:
//!
//! ```text
//! server → client   # aprsc 2.1.4-g408ed49                       (banner)
//! client → server   user N0CALL pass 12345 vers APRSGateway 1.0  (login)
//! server → client   # logresp N0CALL verified, server T2TEST      (ack)
//! server → client   N0CALL>APRS,TCPIP*:!5130.00N/00010.00W-      (data)
//! server → client   # aprsc 2.1.4 19 Oct 2026 12:00:00 GMT ...     (keepalive)
//! ```
//!
//! Lines starting with `#` come from the server itself and never carry
//! position data.

pub mod dump;
pub mod line;
pub mod login;

pub use dump::{dump_frame, hex_dump};
pub use line::{is_server_comment, rtrim, terminate, COMMENT_MARKER, LINE_TERMINATOR};
pub use login::{Credentials, CredentialsError, LoginRequest, CALLSIGN_LENGTH};
