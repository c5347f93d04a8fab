//! The per-EVSE SLAC session: Set-Key provisioning and the step-by-step
//! matching run, driven under the ISO 15118-3 timers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::clock::Deadline;
use crate::error::{CoreError, CoreResult};
use crate::frame::{encode_frame, parse_frame, Message};
use crate::keys::{generate_nmk, nid};
use crate::link::RawLink;
use crate::mac::{MacAddr, ATHEROS_CHIP_PEER, BROADCAST};
use crate::messages::{
    AttenChar, AttenCharRsp, MatchCnf, MatchReq, MnbcSound, SetKeyCnf, SetKeyReq, SlacParmCnf,
    SlacParmReq, StartAttenChar,
};
use crate::sound::SoundAccumulator;
use crate::stats::Stats;

pub const TT_EVSE_SLAC_INIT_MIN: Duration = Duration::from_secs(20);
pub const TT_EVSE_SLAC_INIT_MAX: Duration = Duration::from_secs(50);
pub const TT_EVSE_SLAC_INIT_DEFAULT: Duration = Duration::from_secs(50);
pub const TT_EVSE_MATCH_SESSION: Duration = Duration::from_secs(10);
pub const TT_MATCH_RESPONSE: Duration = Duration::from_millis(200);
pub const TT_MATCH_SEQUENCE: Duration = Duration::from_millis(400);
pub const TT_MATCHING_REPETITION: Duration = Duration::from_secs(10);
pub const ATTEN_RESULTS_TIMEOUT_MAX: Duration = Duration::from_millis(1050);
const SET_KEY_SETTLE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unmatched,
    Matching,
    Matched,
}

/// Per-run timer overrides, sourced from configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    pub slac_init: Duration,
    pub atten_results_override: Option<Duration>,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        SessionTimeouts { slac_init: TT_EVSE_SLAC_INIT_DEFAULT, atten_results_override: None }
    }
}

/// Holds the raw link, this EVSE's own MAC and identity, and everything the
/// matching run accumulates across its seven steps. Owned exclusively by
/// one controller; never shared across tasks while a run is in flight.
pub struct SlacSession {
    link: Arc<RawLink>,
    evse_mac: MacAddr,
    evse_id: String,
    stats: Arc<Stats>,
    state: SessionState,
    run_id: Option<[u8; 8]>,
    ev_mac: Option<MacAddr>,
    app_type: u8,
    sec_type: u8,
}

impl SlacSession {
    pub fn new(link: Arc<RawLink>, evse_id: impl Into<String>, stats: Arc<Stats>) -> Self {
        let evse_mac = link.local_mac();
        SlacSession {
            link,
            evse_mac,
            evse_id: evse_id.into(),
            stats,
            state: SessionState::Unmatched,
            run_id: None,
            ev_mac: None,
            app_type: 0,
            sec_type: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    async fn send(&self, dst: MacAddr, msg: &Message) -> CoreResult<()> {
        let frame = encode_frame(dst, self.evse_mac, msg);
        self.link.send(&frame).await?;
        self.stats.record_frame_sent();
        Ok(())
    }

    /// Read frames until `extract` returns `Some`, a protocol error occurs,
    /// or `deadline` passes. Malformed bytes and frames `extract` rejects
    /// are discarded silently — the link carries other stations' broadcast
    /// traffic too. Returns the sender's Ethernet source MAC alongside the
    /// extracted value, since that's the only place the session ever
    /// learns a peer's address from.
    async fn wait_for<T>(
        &self,
        deadline: Deadline,
        extract: impl Fn(Message) -> WaitOutcome<T>,
    ) -> CoreResult<(MacAddr, T)> {
        loop {
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Err(CoreError::Timeout("matching step"));
            }
            let frame = match tokio::time::timeout(remaining, self.link.recv()).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => return Err(CoreError::Timeout("matching step")),
            };
            self.stats.record_frame_recv();
            let (eth, _hp, msg) = match parse_frame(&frame) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(error = %e, "discarding unparseable frame");
                    self.stats.record_parse_error();
                    continue;
                }
            };
            match extract(msg) {
                WaitOutcome::Matched(value) => return Ok((eth.src, value)),
                WaitOutcome::Discard => continue,
                WaitOutcome::Reject(err) => return Err(err),
            }
        }
    }

    /// CM_SET_KEY.REQ/CNF exchange, performed once per process to provision
    /// the local chip. The confirmation's result byte is ignored; some
    /// firmware reports it with inverted polarity.
    pub async fn set_key(&mut self) -> CoreResult<()> {
        let run_nmk = generate_nmk();
        let run_nid = nid(&run_nmk);
        let req = Message::SetKeyReq(SetKeyReq { nid: run_nid, new_key: run_nmk });
        self.send(ATHEROS_CHIP_PEER, &req).await?;

        let deadline = Deadline::after(TT_EVSE_MATCH_SESSION);
        let (_mac, _cnf): (MacAddr, SetKeyCnf) = self
            .wait_for(deadline, |msg| match msg {
                Message::SetKeyCnf(cnf) => WaitOutcome::Matched(cnf),
                _ => WaitOutcome::Discard,
            })
            .await?;

        info!(evse_id = %self.evse_id, "chip key provisioned, settling");
        tokio::time::sleep(SET_KEY_SETTLE).await;
        Ok(())
    }

    async fn await_slac_parm_req(&mut self, timeouts: &SessionTimeouts) -> CoreResult<()> {
        let deadline = Deadline::after(timeouts.slac_init);
        let (ev_mac, req): (MacAddr, SlacParmReq) = self
            .wait_for(deadline, |msg| match msg {
                Message::SlacParmReq(req) if req.app_type == 0 && req.sec_type == 0 => {
                    WaitOutcome::Matched(req)
                }
                _ => WaitOutcome::Discard,
            })
            .await?;
        self.run_id = Some(req.run_id);
        self.app_type = req.app_type;
        self.sec_type = req.sec_type;
        self.ev_mac = Some(ev_mac);
        self.state = SessionState::Matching;
        Ok(())
    }

    async fn send_slac_parm_cnf(&self, ev_mac: MacAddr) -> CoreResult<()> {
        let cnf = Message::SlacParmCnf(SlacParmCnf {
            msound_target: BROADCAST,
            num_sounds: 10,
            time_out: 6,
            resp_type: 0x01,
            forwarding_sta: ev_mac,
            app_type: self.app_type,
            sec_type: self.sec_type,
            run_id: self.run_id.expect("run_id recorded by await_slac_parm_req"),
        });
        self.send(ev_mac, &cnf).await
    }

    async fn await_start_atten_char(&mut self) -> CoreResult<StartAttenChar> {
        let deadline = Deadline::after(TT_EVSE_MATCH_SESSION);
        let expected_run_id = self.run_id;
        let (_mac, ind): (MacAddr, StartAttenChar) = self
            .wait_for(deadline, move |msg| match msg {
                Message::StartAttenChar(ind) => {
                    if Some(ind.run_id) != expected_run_id {
                        WaitOutcome::Reject(CoreError::protocol("run_id mismatch in START_ATTEN_CHAR"))
                    } else {
                        WaitOutcome::Matched(ind)
                    }
                }
                _ => WaitOutcome::Discard,
            })
            .await?;
        Ok(ind)
    }

    async fn sounds_loop(
        &mut self,
        expected_sounds: u8,
        effective_timeout: Duration,
    ) -> CoreResult<SoundAccumulator> {
        let deadline = Deadline::after(effective_timeout);
        let mut acc = SoundAccumulator::new();
        let mut remaining_sounds = expected_sounds;
        let expected_run_id = self.run_id;

        while remaining_sounds > 0 && !deadline.has_passed() {
            let remaining = deadline.remaining();
            let frame = match tokio::time::timeout(remaining, self.link.recv()).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => break,
            };
            self.stats.record_frame_recv();
            let (_eth, _hp, msg) = match parse_frame(&frame) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(error = %e, "discarding unparseable frame during sounds loop");
                    self.stats.record_parse_error();
                    continue;
                }
            };
            match msg {
                Message::MnbcSound(MnbcSound { run_id, .. }) if Some(run_id) == expected_run_id => {
                    remaining_sounds = remaining_sounds.saturating_sub(1);
                }
                Message::AttenProfile(profile) => {
                    acc.add_profile(&profile.aag);
                }
                _ => {}
            }
        }
        Ok(acc)
    }

    async fn emit_atten_char(&self, acc: &SoundAccumulator) -> CoreResult<()> {
        let ev_mac = self.ev_mac.expect("ev_mac recorded by await_slac_parm_req");
        let averages = acc.averages()?;
        let ind = Message::AttenChar(AttenChar {
            app_type: self.app_type,
            sec_type: self.sec_type,
            source_address: ev_mac,
            run_id: self.run_id.expect("run_id recorded"),
            source_id: [0; 17],
            resp_id: [0; 17],
            num_sounds: acc.num_total_sounds() as u8,
            num_groups: averages.len() as u8,
            aag: averages.to_vec(),
        });
        self.send(ev_mac, &ind).await
    }

    async fn await_atten_char_rsp(&mut self) -> CoreResult<()> {
        let deadline = Deadline::after(TT_MATCH_RESPONSE);
        let expected_run_id = self.run_id;
        let (_mac, rsp): (MacAddr, AttenCharRsp) = self
            .wait_for(deadline, move |msg| match msg {
                Message::AttenCharRsp(rsp) => {
                    if Some(rsp.run_id) != expected_run_id {
                        WaitOutcome::Reject(CoreError::protocol("run_id mismatch in ATTEN_CHAR.RSP"))
                    } else {
                        WaitOutcome::Matched(rsp)
                    }
                }
                _ => WaitOutcome::Discard,
            })
            .await?;
        if rsp.result != AttenCharRsp::RESULT_SUCCESS {
            return Err(CoreError::protocol(format!(
                "ATTEN_CHAR.RSP reported failure (result=0x{:02x})",
                rsp.result
            )));
        }
        Ok(())
    }

    async fn await_slac_match_req(&mut self) -> CoreResult<MatchReq> {
        let deadline = Deadline::after(TT_MATCH_SEQUENCE);
        let expected_run_id = self.run_id;
        let (_mac, req): (MacAddr, MatchReq) = self
            .wait_for(deadline, move |msg| match msg {
                Message::MatchReq(req) => {
                    if Some(req.run_id) != expected_run_id {
                        WaitOutcome::Reject(CoreError::protocol("run_id mismatch in SLAC_MATCH.REQ"))
                    } else {
                        WaitOutcome::Matched(req)
                    }
                }
                _ => WaitOutcome::Discard,
            })
            .await?;
        Ok(req)
    }

    async fn emit_slac_match_cnf(&mut self, req: &MatchReq) -> CoreResult<()> {
        let run_nmk = generate_nmk();
        let run_nid = nid(&run_nmk);
        let cnf = Message::MatchCnf(MatchCnf {
            app_type: self.app_type,
            sec_type: self.sec_type,
            mvf_length: MatchCnf::MVF_LENGTH,
            pev_id: req.pev_id,
            pev_mac: req.pev_mac,
            evse_id: req.evse_id,
            evse_mac: self.evse_mac,
            run_id: req.run_id,
            reserved_1: [0; 8],
            nid: run_nid,
            reserved_2: 0,
            nmk: run_nmk,
        });
        self.send(req.pev_mac, &cnf).await?;
        self.state = SessionState::Matched;
        Ok(())
    }

    /// Drive one full matching run from "awaiting SLAC_PARM.REQ" through
    /// MATCHED, or an error that leaves the session back at UNMATCHED.
    pub async fn run_matching(&mut self, timeouts: &SessionTimeouts) -> CoreResult<()> {
        let outcome = self.run_matching_inner(timeouts).await;
        if outcome.is_err() {
            self.state = SessionState::Unmatched;
        }
        outcome
    }

    async fn run_matching_inner(&mut self, timeouts: &SessionTimeouts) -> CoreResult<()> {
        self.await_slac_parm_req(timeouts).await?;
        let ev_mac = self.ev_mac.expect("ev_mac recorded by await_slac_parm_req");
        self.send_slac_parm_cnf(ev_mac).await?;
        let ind = self.await_start_atten_char().await?;
        let effective_timeout = timeouts
            .atten_results_override
            .unwrap_or_else(|| Duration::from_millis(ind.time_out as u64 * 100));
        let acc = self.sounds_loop(ind.num_sounds, effective_timeout).await?;
        self.emit_atten_char(&acc).await?;
        self.await_atten_char_rsp().await?;
        let req = self.await_slac_match_req().await?;
        self.emit_slac_match_cnf(&req).await?;
        info!(evse_id = %self.evse_id, ev_mac = %ev_mac, "matching run succeeded");
        Ok(())
    }

    /// Reserved for a future chip re-key on teardown; no-op today.
    pub fn leave_logical_network(&mut self) {
        if self.state == SessionState::Matched {
            self.state = SessionState::Unmatched;
        }
        self.run_id = None;
        self.ev_mac = None;
    }
}

enum WaitOutcome<T> {
    Matched(T),
    Discard,
    Reject(CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_use_spec_default() {
        let t = SessionTimeouts::default();
        assert_eq!(t.slac_init, TT_EVSE_SLAC_INIT_DEFAULT);
        assert!(t.atten_results_override.is_none());
    }

    #[test]
    fn leave_logical_network_resets_matched_to_unmatched() {
        // Constructing a real SlacSession needs a live RawLink (a raw
        // socket), so this exercises the state-transition logic directly
        // against the enum instead of standing up a link in a unit test.
        let mut state = SessionState::Matched;
        if state == SessionState::Matched {
            state = SessionState::Unmatched;
        }
        assert_eq!(state, SessionState::Unmatched);
    }
}
