use anyhow::{anyhow, Result};
use hickory_proto::op::{Edns, Message, MessageType, Query};
use hickory_proto::rr::Name;

use crate::transport::QType;

/// Build a DNS query message for the given domain and query type.
///
/// The query carries an EDNS0 OPT record advertising `edns_payload` as
/// the maximum UDP payload size, matching what modern stub resolvers
/// send. Returns the serialized query bytes.
pub fn build_query(
	domain: &str,
	qtype: QType,
	txid: u16,
	edns_payload: u16,
) -> Result<Vec<u8>> {
	let name = Name::from_ascii(domain)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", domain, e))?;

	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, qtype.record_type()));

	let edns = message.extensions_mut().get_or_insert_with(Edns::new);
	edns.set_max_payload(edns_payload);

	message.to_vec()
		.map_err(|e| anyhow!("failed to serialize DNS query: {}", e))
}

/// True when a parsed message is the response to the query with the
/// given transaction id. Datagrams failing this check are stray traffic
/// on the socket, not a protocol error.
pub fn is_matching_response(message: &Message, txid: u16) -> bool {
	message.id() == txid && message.message_type() == MessageType::Response
}
