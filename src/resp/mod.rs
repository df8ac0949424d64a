//! RESP2/RESP3 wire value and codec.

mod codec;
mod value;

use bytes::Bytes;

pub use codec::{encode_for_protocol, Command, RespCodec};
pub use value::Value;

/// Build a [`Command`] from byte-slice arguments, the shape every public
/// command wrapper ends up calling into.
pub fn command(args: &[&[u8]]) -> Command {
    Command::new(args.iter().map(|a| Bytes::copy_from_slice(a)).collect())
}
