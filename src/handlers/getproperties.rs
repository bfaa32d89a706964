//! Reports the protocol version and the server's architecture.

use testagent_protocol::PROTOCOL_VERSION;

use crate::connection::Connection;
use crate::handlers::{HandlerResult, Outcome};

pub fn handle(conn: &mut Connection) -> HandlerResult {
    let sent = {
        let mut enc = conn.encoder();
        enc.write_list_size(2)
            .and_then(|()| enc.write_string(PROTOCOL_VERSION))
            .and_then(|()| enc.write_string(std::env::consts::ARCH))
    };
    sent?;
    Ok(Outcome::Done)
}
