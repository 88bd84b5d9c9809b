//! The privacy mapper: per-URI, per-direction message rewriting.
//!
//! A table keyed by `(RPC URI, direction)` selects a handler. The
//! handler decodes the serialized message, rewrites its sensitive
//! fields through the session's pseudonym map and the fuzzers, and
//! re-serializes the result as a replacement. Messages with no
//! matching rule pass through unmodified.
//!
//! The whole rewrite of one message runs under a single map
//! transaction: either every freshly allocated pseudonym is persisted
//! together with the replacement being emitted, or none is.

use prost::Message;

use lngate_db::privacy_map::{
    hide_chan_point, hide_chan_point_str, hide_string, hide_u64, reveal_bytes, reveal_chan_point,
};
use lngate_db::{GateDb, PrivacyMapTx};
use lngate_types::config::PrivacyConfig;
use lngate_types::{GateError, Result};

use crate::fuzz::{hide_amount, hide_bool, hide_timestamp, RandIntn};
use crate::intercept::{
    session_id_from_macaroon, InterceptFeedback, InterceptType, InterceptionRequest,
};
use crate::lnrpc;

// ---------------------------------------------------------------------------
// Covered URIs
// ---------------------------------------------------------------------------

const URI_GET_INFO: &str = "/lnrpc.Lightning/GetInfo";
const URI_FORWARDING_HISTORY: &str = "/lnrpc.Lightning/ForwardingHistory";
const URI_FEE_REPORT: &str = "/lnrpc.Lightning/FeeReport";
const URI_LIST_CHANNELS: &str = "/lnrpc.Lightning/ListChannels";
const URI_UPDATE_CHANNEL_POLICY: &str = "/lnrpc.Lightning/UpdateChannelPolicy";

const NANOS_PER_SEC: u64 = 1_000_000_000;
const MSAT_PER_SAT: u64 = 1_000;

/// Returns whether a rewrite rule exists for `(uri, direction)`.
fn has_rule(uri: &str, direction: InterceptType) -> bool {
    use InterceptType::{Request, Response};

    matches!(
        (uri, direction),
        (URI_GET_INFO, Response)
            | (URI_FORWARDING_HISTORY, Response)
            | (URI_FEE_REPORT, Response)
            | (URI_LIST_CHANNELS, Request)
            | (URI_LIST_CHANNELS, Response)
            | (URI_UPDATE_CHANNEL_POLICY, Request)
            | (URI_UPDATE_CHANNEL_POLICY, Response)
    )
}

// ---------------------------------------------------------------------------
// PrivacyMapper
// ---------------------------------------------------------------------------

/// RPC interceptor substituting pseudonyms and noise for real data.
///
/// The mapper is re-entrant: it holds no state beyond the database
/// handle, the randomness source and the fuzzing configuration, so
/// concurrent interceptions across sessions proceed in parallel and
/// serialize only on the map's writer lock.
pub struct PrivacyMapper {
    db: GateDb,
    rand_intn: RandIntn,
    config: PrivacyConfig,
}

impl PrivacyMapper {
    /// Creates a new mapper over the given database.
    ///
    /// `rand_intn` is the randomness source for the fuzzed fields —
    /// injectable so rewrites can be made deterministic in tests.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if `config` fails validation.
    pub fn new(db: GateDb, rand_intn: RandIntn, config: PrivacyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            db,
            rand_intn,
            config,
        })
    }

    /// Rewrites one intercepted message.
    ///
    /// Returns pass-through feedback for stream-auth interceptions and
    /// for URIs without a rewrite rule. Refuses interceptions that
    /// carry no usable session identity.
    ///
    /// # Errors
    ///
    /// Any error means the message must not be forwarded.
    pub fn intercept(&self, req: &InterceptionRequest) -> Result<InterceptFeedback> {
        if req.request_type == InterceptType::StreamAuth {
            return Ok(InterceptFeedback::pass_through());
        }

        let macaroon = req.macaroon.as_ref().ok_or_else(|| GateError::InvalidSession {
            reason: "no macaroon presented".into(),
        })?;
        let session_id = session_id_from_macaroon(macaroon)?;

        if !has_rule(&req.full_uri, req.request_type) {
            return Ok(InterceptFeedback::pass_through());
        }

        tracing::debug!(
            uri = %req.full_uri,
            direction = ?req.request_type,
            %session_id,
            "rewriting intercepted message"
        );

        let map = self.db.privacy_map(session_id)?;
        let replacement = map.update(|tx| {
            self.rewrite(tx, &req.full_uri, req.request_type, &req.proto_serialized)
        })?;

        Ok(InterceptFeedback::replacement(replacement))
    }

    // -- Handlers ---------------------------------------------------------

    fn rewrite(
        &self,
        tx: &PrivacyMapTx<'_>,
        uri: &str,
        direction: InterceptType,
        msg: &[u8],
    ) -> Result<Vec<u8>> {
        use InterceptType::{Request, Response};

        match (uri, direction) {
            (URI_GET_INFO, Response) => self.rewrite_get_info(tx, msg),
            (URI_FORWARDING_HISTORY, Response) => self.rewrite_forwarding_history(tx, msg),
            (URI_FEE_REPORT, Response) => self.rewrite_fee_report(tx, msg),
            (URI_LIST_CHANNELS, Request) => self.rewrite_list_channels_request(tx, msg),
            (URI_LIST_CHANNELS, Response) => self.rewrite_list_channels_response(tx, msg),
            (URI_UPDATE_CHANNEL_POLICY, Request) => self.rewrite_policy_update_request(tx, msg),
            (URI_UPDATE_CHANNEL_POLICY, Response) => self.rewrite_policy_update_response(tx, msg),
            _ => Err(GateError::Intercept {
                reason: format!("no rewrite rule for {uri}"),
            }),
        }
    }

    /// Hides the node's identity key; every other info field is
    /// cleared.
    fn rewrite_get_info(&self, tx: &PrivacyMapTx<'_>, msg: &[u8]) -> Result<Vec<u8>> {
        let src = decode::<lnrpc::GetInfoResponse>(msg)?;

        let replacement = lnrpc::GetInfoResponse {
            identity_pubkey: hide_string(tx, &src.identity_pubkey)?,
            ..Default::default()
        };

        Ok(replacement.encode_to_vec())
    }

    /// Fuzzes amounts and timestamps and hides channel ids.
    ///
    /// The outgoing amount and the fee are fuzzed independently; the
    /// incoming amount is their sum so the per-event fee identity
    /// still holds. The satoshi fields are derived from the msat
    /// fields, the second timestamp from the nanosecond one.
    fn rewrite_forwarding_history(&self, tx: &PrivacyMapTx<'_>, msg: &[u8]) -> Result<Vec<u8>> {
        let src = decode::<lnrpc::ForwardingHistoryResponse>(msg)?;

        let mut events = Vec::with_capacity(src.forwarding_events.len());
        for event in &src.forwarding_events {
            let fee_msat = self.fuzz_amount(event.fee_msat)?;
            let amt_out_msat = self.fuzz_amount(event.amt_out_msat)?;
            let amt_in_msat = amt_out_msat + fee_msat;
            let timestamp_ns = self.fuzz_timestamp(event.timestamp_ns)?;

            events.push(lnrpc::ForwardingEvent {
                timestamp: timestamp_ns / NANOS_PER_SEC,
                timestamp_ns,
                chan_id_in: hide_u64(tx, event.chan_id_in)?,
                chan_id_out: hide_u64(tx, event.chan_id_out)?,
                amt_in: amt_in_msat / MSAT_PER_SAT,
                amt_out: amt_out_msat / MSAT_PER_SAT,
                fee: fee_msat / MSAT_PER_SAT,
                fee_msat,
                amt_in_msat,
                amt_out_msat,
            });
        }

        let replacement = lnrpc::ForwardingHistoryResponse {
            forwarding_events: events,
            last_offset_index: src.last_offset_index,
        };

        Ok(replacement.encode_to_vec())
    }

    /// Hides channel identities; the fee schedule itself is public
    /// routing data and stays.
    fn rewrite_fee_report(&self, tx: &PrivacyMapTx<'_>, msg: &[u8]) -> Result<Vec<u8>> {
        let mut report = decode::<lnrpc::FeeReportResponse>(msg)?;

        for fees in &mut report.channel_fees {
            fees.chan_id = hide_u64(tx, fees.chan_id)?;
            fees.channel_point = hide_chan_point_str(tx, &fees.channel_point)?;
        }

        Ok(report.encode_to_vec())
    }

    /// Resolves the pseudonym peer filter so the node sees the real
    /// peer key.
    fn rewrite_list_channels_request(&self, tx: &PrivacyMapTx<'_>, msg: &[u8]) -> Result<Vec<u8>> {
        let mut request = decode::<lnrpc::ListChannelsRequest>(msg)?;
        request.peer = reveal_bytes(tx, &request.peer)?;
        Ok(request.encode_to_vec())
    }

    /// Hides channel identities and balances.
    ///
    /// The local balance is fuzzed and the remote balance derived from
    /// the preserved capacity, keeping the capacity identity
    /// consistent within each channel. Pending HTLCs keep their count
    /// but lose every field.
    fn rewrite_list_channels_response(
        &self,
        tx: &PrivacyMapTx<'_>,
        msg: &[u8],
    ) -> Result<Vec<u8>> {
        let src = decode::<lnrpc::ListChannelsResponse>(msg)?;

        let mut channels = Vec::with_capacity(src.channels.len());
        for channel in &src.channels {
            let local_balance = self.fuzz_amount(channel.local_balance as u64)? as i64;
            let remote_balance = channel.capacity - local_balance;

            channels.push(lnrpc::Channel {
                capacity: channel.capacity,
                commit_fee: channel.commit_fee,
                local_balance,
                remote_balance,
                total_satoshis_sent: self.fuzz_amount(channel.total_satoshis_sent as u64)? as i64,
                total_satoshis_received: self.fuzz_amount(channel.total_satoshis_received as u64)?
                    as i64,
                remote_pubkey: hide_string(tx, &channel.remote_pubkey)?,
                initiator: hide_bool(&self.rand_intn)?,
                chan_id: hide_u64(tx, channel.chan_id)?,
                channel_point: hide_chan_point_str(tx, &channel.channel_point)?,
                pending_htlcs: vec![lnrpc::Htlc::default(); channel.pending_htlcs.len()],
                ..Default::default()
            });
        }

        let replacement = lnrpc::ListChannelsResponse { channels };
        Ok(replacement.encode_to_vec())
    }

    /// Resolves the pseudonym channel point back to the real funding
    /// output, always emitting the string txid variant.
    fn rewrite_policy_update_request(&self, tx: &PrivacyMapTx<'_>, msg: &[u8]) -> Result<Vec<u8>> {
        use lnrpc::channel_point::FundingTxid;
        use lnrpc::policy_update_request::Scope;

        let mut request = decode::<lnrpc::PolicyUpdateRequest>(msg)?;

        if let Some(Scope::ChanPoint(chan_point)) = &request.scope {
            let txid = match &chan_point.funding_txid {
                Some(FundingTxid::FundingTxidStr(txid)) => txid.clone(),
                Some(FundingTxid::FundingTxidBytes(bytes)) => {
                    // The binary form carries the txid reversed.
                    let mut reversed = bytes.clone();
                    reversed.reverse();
                    hex::encode(reversed)
                }
                None => {
                    return Err(GateError::Intercept {
                        reason: "channel point carries no funding txid".into(),
                    })
                }
            };

            let (real_txid, real_index) =
                reveal_chan_point(tx, &txid, chan_point.output_index)?;

            request.scope = Some(Scope::ChanPoint(lnrpc::ChannelPoint {
                funding_txid: Some(FundingTxid::FundingTxidStr(real_txid)),
                output_index: real_index,
            }));
        }

        Ok(request.encode_to_vec())
    }

    /// Hides the outpoints of channels the node failed to update.
    fn rewrite_policy_update_response(
        &self,
        tx: &PrivacyMapTx<'_>,
        msg: &[u8],
    ) -> Result<Vec<u8>> {
        let mut response = decode::<lnrpc::PolicyUpdateResponse>(msg)?;

        for failed in &mut response.failed_updates {
            if let Some(outpoint) = &mut failed.outpoint {
                let (txid, index) = hide_chan_point(tx, &outpoint.txid_str, outpoint.output_index)?;
                outpoint.txid_bytes = Vec::new();
                outpoint.txid_str = txid;
                outpoint.output_index = index;
            }
        }

        Ok(response.encode_to_vec())
    }

    // -- Fuzzing shorthands ------------------------------------------------

    fn fuzz_amount(&self, amount: u64) -> Result<u64> {
        hide_amount(&self.rand_intn, self.config.amount_variation, amount)
    }

    fn fuzz_timestamp(&self, timestamp_ns: u64) -> Result<u64> {
        hide_timestamp(
            &self.rand_intn,
            self.config.time_variation_nanos(),
            timestamp_ns,
        )
    }
}

/// Decodes an intercepted message into its protocol type.
fn decode<M: Message + Default>(msg: &[u8]) -> Result<M> {
    M::decode(msg).map_err(|e| GateError::Intercept {
        reason: format!("failed to decode intercepted message: {e}"),
    })
}
