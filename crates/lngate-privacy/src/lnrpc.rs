//! Hand-maintained subset of the node's RPC message definitions.
//!
//! Only the messages the privacy mapper rewrites are declared here,
//! with field tags matching the node's published protocol so the
//! re-serialized replacements are wire-compatible. Fields outside this
//! subset decode as unknown and are dropped from rewritten messages —
//! for a privacy filter, dropping is the conservative direction.

/// Macaroon identifier payload carried after the format version byte.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MacaroonId {
    #[prost(bytes = "vec", tag = "1")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub storage_id: Vec<u8>,
}

/// Response to the node info call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetInfoResponse {
    #[prost(string, tag = "1")]
    pub identity_pubkey: String,
    #[prost(string, tag = "2")]
    pub alias: String,
    #[prost(uint32, tag = "3")]
    pub num_pending_channels: u32,
    #[prost(uint32, tag = "4")]
    pub num_active_channels: u32,
    #[prost(uint32, tag = "5")]
    pub num_peers: u32,
    #[prost(uint32, tag = "6")]
    pub block_height: u32,
    #[prost(string, tag = "8")]
    pub block_hash: String,
    #[prost(bool, tag = "9")]
    pub synced_to_chain: bool,
    #[prost(string, repeated, tag = "12")]
    pub uris: Vec<String>,
    #[prost(int64, tag = "13")]
    pub best_header_timestamp: i64,
    #[prost(string, tag = "14")]
    pub version: String,
}

/// One forwarded HTLC in the forwarding history.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ForwardingEvent {
    #[prost(uint64, tag = "1")]
    pub timestamp: u64,
    #[prost(uint64, tag = "2")]
    pub chan_id_in: u64,
    #[prost(uint64, tag = "4")]
    pub chan_id_out: u64,
    #[prost(uint64, tag = "5")]
    pub amt_in: u64,
    #[prost(uint64, tag = "6")]
    pub amt_out: u64,
    #[prost(uint64, tag = "7")]
    pub fee: u64,
    #[prost(uint64, tag = "8")]
    pub fee_msat: u64,
    #[prost(uint64, tag = "9")]
    pub amt_in_msat: u64,
    #[prost(uint64, tag = "10")]
    pub amt_out_msat: u64,
    #[prost(uint64, tag = "11")]
    pub timestamp_ns: u64,
}

/// Response to the forwarding history call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ForwardingHistoryResponse {
    #[prost(message, repeated, tag = "1")]
    pub forwarding_events: Vec<ForwardingEvent>,
    #[prost(uint32, tag = "2")]
    pub last_offset_index: u32,
}

/// Fee schedule of one channel.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelFeeReport {
    #[prost(string, tag = "1")]
    pub channel_point: String,
    #[prost(int64, tag = "2")]
    pub base_fee_msat: i64,
    #[prost(int64, tag = "3")]
    pub fee_per_mil: i64,
    #[prost(double, tag = "4")]
    pub fee_rate: f64,
    #[prost(uint64, tag = "5")]
    pub chan_id: u64,
}

/// Response to the fee report call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FeeReportResponse {
    #[prost(message, repeated, tag = "1")]
    pub channel_fees: Vec<ChannelFeeReport>,
    #[prost(uint64, tag = "2")]
    pub day_fee_sum: u64,
    #[prost(uint64, tag = "3")]
    pub week_fee_sum: u64,
    #[prost(uint64, tag = "4")]
    pub month_fee_sum: u64,
}

/// Request for the channel listing call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListChannelsRequest {
    #[prost(bool, tag = "1")]
    pub active_only: bool,
    #[prost(bool, tag = "2")]
    pub inactive_only: bool,
    #[prost(bool, tag = "3")]
    pub public_only: bool,
    #[prost(bool, tag = "4")]
    pub private_only: bool,
    #[prost(bytes = "vec", tag = "5")]
    pub peer: Vec<u8>,
}

/// One pending HTLC on a channel.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Htlc {
    #[prost(bool, tag = "1")]
    pub incoming: bool,
    #[prost(int64, tag = "2")]
    pub amount: i64,
    #[prost(bytes = "vec", tag = "3")]
    pub hash_lock: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub expiration_height: u32,
    #[prost(uint64, tag = "5")]
    pub htlc_index: u64,
    #[prost(uint64, tag = "6")]
    pub forwarding_channel: u64,
    #[prost(uint64, tag = "7")]
    pub forwarding_htlc_index: u64,
}

/// One open channel.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Channel {
    #[prost(bool, tag = "1")]
    pub active: bool,
    #[prost(string, tag = "2")]
    pub remote_pubkey: String,
    #[prost(string, tag = "3")]
    pub channel_point: String,
    #[prost(uint64, tag = "4")]
    pub chan_id: u64,
    #[prost(int64, tag = "5")]
    pub capacity: i64,
    #[prost(int64, tag = "6")]
    pub local_balance: i64,
    #[prost(int64, tag = "7")]
    pub remote_balance: i64,
    #[prost(int64, tag = "8")]
    pub commit_fee: i64,
    #[prost(int64, tag = "9")]
    pub commit_weight: i64,
    #[prost(int64, tag = "10")]
    pub fee_per_kw: i64,
    #[prost(int64, tag = "11")]
    pub unsettled_balance: i64,
    #[prost(int64, tag = "12")]
    pub total_satoshis_sent: i64,
    #[prost(int64, tag = "13")]
    pub total_satoshis_received: i64,
    #[prost(uint64, tag = "14")]
    pub num_updates: u64,
    #[prost(message, repeated, tag = "15")]
    pub pending_htlcs: Vec<Htlc>,
    #[prost(uint32, tag = "16")]
    pub csv_delay: u32,
    #[prost(bool, tag = "17")]
    pub private: bool,
    #[prost(bool, tag = "18")]
    pub initiator: bool,
    #[prost(string, tag = "19")]
    pub chan_status_flags: String,
}

/// Response to the channel listing call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListChannelsResponse {
    #[prost(message, repeated, tag = "11")]
    pub channels: Vec<Channel>,
}

/// A channel funding outpoint. The binary txid variant carries the
/// hash in reversed byte order relative to the hex string form.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelPoint {
    #[prost(oneof = "channel_point::FundingTxid", tags = "1, 2")]
    pub funding_txid: Option<channel_point::FundingTxid>,
    #[prost(uint32, tag = "3")]
    pub output_index: u32,
}

pub mod channel_point {
    /// The two encodings of the funding transaction id.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum FundingTxid {
        #[prost(bytes, tag = "1")]
        FundingTxidBytes(Vec<u8>),
        #[prost(string, tag = "2")]
        FundingTxidStr(String),
    }
}

/// Request updating the routing policy of one or all channels.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PolicyUpdateRequest {
    #[prost(oneof = "policy_update_request::Scope", tags = "1, 2")]
    pub scope: Option<policy_update_request::Scope>,
    #[prost(int64, tag = "3")]
    pub base_fee_msat: i64,
    #[prost(double, tag = "4")]
    pub fee_rate: f64,
    #[prost(uint32, tag = "5")]
    pub time_lock_delta: u32,
    #[prost(uint64, tag = "6")]
    pub max_htlc_msat: u64,
    #[prost(uint64, tag = "7")]
    pub min_htlc_msat: u64,
    #[prost(bool, tag = "8")]
    pub min_htlc_msat_specified: bool,
    #[prost(uint32, tag = "9")]
    pub fee_rate_ppm: u32,
}

pub mod policy_update_request {
    /// Whether the update applies globally or to one channel.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Scope {
        #[prost(bool, tag = "1")]
        Global(bool),
        #[prost(message, tag = "2")]
        ChanPoint(super::ChannelPoint),
    }
}

/// A transaction outpoint carrying both txid encodings.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutPoint {
    #[prost(bytes = "vec", tag = "1")]
    pub txid_bytes: Vec<u8>,
    #[prost(string, tag = "2")]
    pub txid_str: String,
    #[prost(uint32, tag = "3")]
    pub output_index: u32,
}

/// One channel a policy update could not be applied to.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FailedUpdate {
    #[prost(message, optional, tag = "1")]
    pub outpoint: Option<OutPoint>,
    /// Failure reason code; opaque to the mapper.
    #[prost(int32, tag = "2")]
    pub reason: i32,
    #[prost(string, tag = "3")]
    pub update_error: String,
}

/// Response to the policy update call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PolicyUpdateResponse {
    #[prost(message, repeated, tag = "1")]
    pub failed_updates: Vec<FailedUpdate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn channel_point_oneof_roundtrip() {
        let cp = ChannelPoint {
            funding_txid: Some(channel_point::FundingTxid::FundingTxidStr(
                "ab".repeat(32),
            )),
            output_index: 7,
        };

        let bytes = cp.encode_to_vec();
        let decoded = ChannelPoint::decode(bytes.as_slice()).expect("decode channel point");
        assert_eq!(cp, decoded);
    }

    #[test]
    fn default_message_encodes_empty() {
        assert!(GetInfoResponse::default().encode_to_vec().is_empty());
        assert!(PolicyUpdateResponse::default().encode_to_vec().is_empty());
    }

    #[test]
    fn unknown_fields_are_skipped() {
        // A ListChannelsRequest encoded by a newer peer may carry
        // fields outside the subset; decoding must not fail.
        let mut bytes = ListChannelsRequest {
            peer: vec![1, 2, 3],
            ..Default::default()
        }
        .encode_to_vec();
        // Field 99, varint wire type, value 1: key = 99 << 3 = 792.
        bytes.extend_from_slice(&[0x98, 0x06, 0x01]);

        let decoded = ListChannelsRequest::decode(bytes.as_slice()).expect("decode");
        assert_eq!(decoded.peer, vec![1, 2, 3]);
    }
}
