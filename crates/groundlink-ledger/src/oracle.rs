//! Multi-validator TLE aggregation.
//!
//! Each active validator holds at most one current submission per satellite.
//! After every accepted submission the pool is re-evaluated: the candidate is
//! the highest-confidence submission (ties go to the most recent), and a new
//! [`ConsensusResult`] is published only when enough distinct active
//! validators contributed and the candidate clears the confidence floor.
//! Falling short is a no-op: the previous result stays in place.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use groundlink_protocol::{
    constants::MAX_SUBMISSION_HISTORY,
    validation::{is_plausible_observation, tle_epoch, validate_tle_pair},
    Address, LedgerError, LedgerEvent, LedgerResult, SatelliteId, Timestamp,
};

use crate::events::Outbox;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validator {
    pub address:  Address,
    pub active:   bool,
    pub added_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TleSubmission {
    pub satellite_id: SatelliteId,
    pub line1:        String,
    pub line2:        String,
    pub observed_at:  Timestamp,
    pub submitted_by: Address,
    pub confidence:   u8,
    pub submitted_at: Timestamp,
    /// Global submission order; breaks confidence ties.
    pub seq:          u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusResult {
    pub satellite_id:    SatelliteId,
    pub is_valid:        bool,
    pub confidence:      u8,
    pub validator_count: u32,
    pub last_update:     Timestamp,
    pub line1:           String,
    pub line2:           String,
    pub observed_at:     Timestamp,
}

#[derive(Debug, Clone)]
pub struct OracleAggregator {
    validators:     BTreeMap<Address, Validator>,
    submissions:    BTreeMap<SatelliteId, BTreeMap<Address, TleSubmission>>,
    history:        BTreeMap<SatelliteId, VecDeque<TleSubmission>>,
    contributors:   BTreeMap<SatelliteId, BTreeSet<Address>>,
    consensus:      BTreeMap<SatelliteId, ConsensusResult>,
    min_validators: u32,
    min_confidence: u8,
    next_seq:       u64,
}

/// A TLE submission as received from a validator.
#[derive(Debug, Clone)]
pub struct TleObservation<'a> {
    pub satellite_id: SatelliteId,
    pub line1:        &'a str,
    pub line2:        &'a str,
    pub observed_at:  Timestamp,
    pub confidence:   u8,
}

impl OracleAggregator {
    pub fn new(min_validators: u32, min_confidence: u8) -> Self {
        Self {
            validators: BTreeMap::new(),
            submissions: BTreeMap::new(),
            history: BTreeMap::new(),
            contributors: BTreeMap::new(),
            consensus: BTreeMap::new(),
            min_validators,
            min_confidence,
            next_seq: 1,
        }
    }

    // ------------------------------------------------------------------------
    // Validator registry
    // ------------------------------------------------------------------------

    pub fn is_active_validator(&self, addr: &Address) -> bool {
        self.validators.get(addr).is_some_and(|v| v.active)
    }

    pub fn validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    pub fn add_validator(&mut self, addr: Address, now: Timestamp, out: &mut Outbox) -> LedgerResult<()> {
        match self.validators.get_mut(&addr) {
            Some(v) if v.active => return Err(LedgerError::AlreadyValidator),
            Some(v) => v.active = true,
            None => {
                self.validators.insert(addr, Validator { address: addr, active: true, added_at: now });
            }
        }
        out.emit(LedgerEvent::ValidatorAdded { validator: addr });
        Ok(())
    }

    /// Deactivates the validator. Its stored submissions stop counting toward
    /// future resolutions; published results are left as they are.
    pub fn remove_validator(&mut self, addr: Address, out: &mut Outbox) -> LedgerResult<()> {
        match self.validators.get_mut(&addr) {
            Some(v) if v.active => v.active = false,
            _ => {
                return Err(LedgerError::InvalidParameter(format!(
                    "{addr} is not an active validator"
                )))
            }
        }
        out.emit(LedgerEvent::ValidatorRemoved { validator: addr });
        Ok(())
    }

    pub fn min_validators(&self) -> u32 {
        self.min_validators
    }

    pub fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    pub fn set_min_validators(&mut self, value: u32, out: &mut Outbox) -> LedgerResult<()> {
        if value == 0 {
            return Err(LedgerError::InvalidParameter("min_validators must be at least 1".into()));
        }
        let old = std::mem::replace(&mut self.min_validators, value);
        out.emit(LedgerEvent::MinValidatorsUpdated { old, new: value });
        Ok(())
    }

    pub fn set_min_confidence(&mut self, value: u8, out: &mut Outbox) -> LedgerResult<()> {
        if value > groundlink_protocol::MAX_CONFIDENCE {
            return Err(LedgerError::InvalidParameter(format!("min_confidence {value} exceeds 100")));
        }
        let old = std::mem::replace(&mut self.min_confidence, value);
        out.emit(LedgerEvent::MinConfidenceUpdated { old, new: value });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------------

    /// Store `validator`'s observation and re-run consensus for the satellite.
    ///
    /// Returns the newly published result, or `None` when thresholds were not
    /// met and the previous result was kept.
    pub fn submit_tle(
        &mut self,
        validator: Address,
        obs: TleObservation<'_>,
        now: Timestamp,
        future_tolerance: u64,
        out: &mut Outbox,
    ) -> LedgerResult<Option<ConsensusResult>> {
        if !self.is_active_validator(&validator) {
            return Err(LedgerError::NotValidator);
        }
        validate_tle_pair(obs.line1, obs.line2)?;
        if obs.confidence > groundlink_protocol::MAX_CONFIDENCE {
            return Err(LedgerError::InvalidTleData(format!(
                "confidence {} exceeds 100",
                obs.confidence
            )));
        }
        if !is_plausible_observation(obs.observed_at, now, future_tolerance) {
            return Err(LedgerError::InvalidTleData(format!(
                "observed_at {} is more than {future_tolerance}s ahead of {now}",
                obs.observed_at
            )));
        }
        if let Some(epoch) = tle_epoch(obs.line1) {
            if !is_plausible_observation(epoch, obs.observed_at, future_tolerance) {
                return Err(LedgerError::InvalidTleData(format!(
                    "element set epoch {epoch} is after the observation at {}",
                    obs.observed_at
                )));
            }
        }

        let pool = self.submissions.entry(obs.satellite_id).or_default();
        if let Some(current) = pool.get(&validator) {
            if obs.observed_at < current.observed_at {
                return Err(LedgerError::StaleObservation {
                    observed_at: obs.observed_at,
                    current:     current.observed_at,
                });
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let submission = TleSubmission {
            satellite_id: obs.satellite_id,
            line1:        obs.line1.to_string(),
            line2:        obs.line2.to_string(),
            observed_at:  obs.observed_at,
            submitted_by: validator,
            confidence:   obs.confidence,
            submitted_at: now,
            seq,
        };
        if let Some(superseded) = pool.insert(validator, submission) {
            let history = self.history.entry(obs.satellite_id).or_default();
            history.push_back(superseded);
            while history.len() > MAX_SUBMISSION_HISTORY {
                history.pop_front();
            }
        }
        self.contributors.entry(obs.satellite_id).or_default().insert(validator);

        out.emit(LedgerEvent::TleSubmitted {
            satellite_id: obs.satellite_id,
            validator,
            observed_at: obs.observed_at,
            confidence: obs.confidence,
        });

        Ok(self.resolve(obs.satellite_id, now, out))
    }

    fn resolve(&mut self, satellite_id: SatelliteId, now: Timestamp, out: &mut Outbox) -> Option<ConsensusResult> {
        let pool = self.submissions.get(&satellite_id)?;
        let counted: Vec<&TleSubmission> = pool
            .values()
            .filter(|s| self.validators.get(&s.submitted_by).is_some_and(|v| v.active))
            .collect();

        let validator_count = counted.len() as u32;
        let candidate = counted.into_iter().max_by_key(|s| (s.confidence, s.seq))?;

        if validator_count < self.min_validators || candidate.confidence < self.min_confidence {
            tracing::debug!(
                satellite_id,
                validator_count,
                max_confidence = candidate.confidence,
                "consensus thresholds not met; keeping previous result"
            );
            return None;
        }

        let result = ConsensusResult {
            satellite_id,
            is_valid: true,
            confidence: candidate.confidence,
            validator_count,
            last_update: now,
            line1: candidate.line1.clone(),
            line2: candidate.line2.clone(),
            observed_at: candidate.observed_at,
        };
        self.consensus.insert(satellite_id, result.clone());
        out.emit(LedgerEvent::ConsensusReached {
            satellite_id,
            confidence: result.confidence,
            validator_count,
        });
        Some(result)
    }

    // ------------------------------------------------------------------------
    // Reads & freshness
    // ------------------------------------------------------------------------

    pub fn consensus(&self, satellite_id: SatelliteId) -> Option<&ConsensusResult> {
        self.consensus.get(&satellite_id)
    }

    /// The last published result. Fails only if the satellite never reached
    /// consensus; an expired result is returned with `is_valid = false`.
    pub fn validated_tle(&self, satellite_id: SatelliteId) -> LedgerResult<&ConsensusResult> {
        self.consensus
            .get(&satellite_id)
            .ok_or(LedgerError::NoValidTle(satellite_id))
    }

    pub fn is_tle_fresh(&self, satellite_id: SatelliteId, now: Timestamp, max_age: u64) -> bool {
        self.consensus
            .get(&satellite_id)
            .is_some_and(|r| r.is_valid && now.saturating_sub(r.last_update) <= max_age)
    }

    /// Freshness check that also flips an expired result to invalid.
    pub fn check_freshness(
        &mut self,
        satellite_id: SatelliteId,
        now: Timestamp,
        max_age: u64,
        out: &mut Outbox,
    ) -> bool {
        if self.is_tle_fresh(satellite_id, now, max_age) {
            return true;
        }
        if let Some(result) = self.consensus.get_mut(&satellite_id) {
            if result.is_valid {
                result.is_valid = false;
                out.emit(LedgerEvent::ConsensusExpired {
                    satellite_id,
                    last_update: result.last_update,
                });
            }
        }
        false
    }

    pub fn submissions(&self, satellite_id: SatelliteId) -> impl Iterator<Item = &TleSubmission> {
        self.submissions.get(&satellite_id).into_iter().flat_map(|pool| pool.values())
    }

    pub fn history(&self, satellite_id: SatelliteId) -> impl Iterator<Item = &TleSubmission> {
        self.history.get(&satellite_id).into_iter().flat_map(|h| h.iter())
    }

    pub fn contributors(&self, satellite_id: SatelliteId) -> impl Iterator<Item = &Address> {
        self.contributors.get(&satellite_id).into_iter().flat_map(|c| c.iter())
    }
}
