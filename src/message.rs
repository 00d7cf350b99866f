//! Wire envelope exchanged between paired ranks.
//!
//! The absent state travels as an explicit [`Payload::NoData`] variant, never
//! as an error. Tags are derived from the round index so a message can only
//! ever be matched by the receive of its own round.

use crate::error::{Error, Result};
use crate::partial::Partial;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// First tag used by the reduction rounds.
pub const ROUND_TAG_BASE: i32 = 0x7E00;

/// Message tag for `round`.
pub fn round_tag(round: u32) -> i32 {
    ROUND_TAG_BASE + round as i32
}

/// Body of a round message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload<R> {
    /// The sender's accumulated result
    Data(R),
    /// The sender has nothing usable to contribute
    NoData,
}

/// A round message with enough metadata to check it against the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<R> {
    /// Rank that sent the message
    pub sender: u32,
    /// Round the message belongs to
    pub round: u32,
    /// Contents
    pub payload: Payload<R>,
}

impl<R> Envelope<R> {
    /// Wrap a partial result for sending. Takes ownership: the sender has no
    /// further use for it.
    pub fn new(sender: usize, round: u32, partial: Partial<R>) -> Self {
        let payload = match partial {
            Partial::Present(r) => Payload::Data(r),
            Partial::Empty | Partial::Failed(_) => Payload::NoData,
        };
        Envelope {
            sender: sender as u32,
            round,
            payload,
        }
    }

    /// An explicit "no data" message.
    pub fn no_data(sender: usize, round: u32) -> Self {
        Envelope {
            sender: sender as u32,
            round,
            payload: Payload::NoData,
        }
    }

    /// Check that the envelope came from the partner the schedule expects.
    pub fn verify(&self, source: usize, round: u32) -> Result<()> {
        if self.sender as usize != source || self.round != round {
            return Err(Error::Protocol(format!(
                "expected round {round} message from rank {source}, got round {} from rank {}",
                self.round, self.sender
            )));
        }
        Ok(())
    }
}

impl<R: Serialize> Envelope<R> {
    /// Serialize to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

impl<R: DeserializeOwned> Envelope<R> {
    /// Deserialize from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct_per_round() {
        let tags: Vec<i32> = (0..8).map(round_tag).collect();
        let mut dedup = tags.clone();
        dedup.dedup();
        assert_eq!(tags, dedup);
        assert_eq!(round_tag(0), ROUND_TAG_BASE);
    }

    #[test]
    fn absent_states_become_no_data() {
        let e: Envelope<u64> = Envelope::new(3, 1, Partial::Failed("all tasks failed".into()));
        assert_eq!(e.payload, Payload::NoData);
        let e: Envelope<u64> = Envelope::new(3, 1, Partial::Empty);
        assert_eq!(e.payload, Payload::NoData);
    }

    #[test]
    fn decode_recovers_data() {
        let e = Envelope::new(5, 0, Partial::Present(vec![1.5f64, 2.5]));
        let back: Envelope<Vec<f64>> = Envelope::decode(&e.encode().unwrap()).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn verify_rejects_wrong_round_or_sender() {
        let e: Envelope<u8> = Envelope::no_data(2, 1);
        assert!(e.verify(2, 1).is_ok());
        assert!(matches!(e.verify(2, 0), Err(Error::Protocol(_))));
        assert!(matches!(e.verify(3, 1), Err(Error::Protocol(_))));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let res = Envelope::<Vec<f64>>::decode(&[0xff, 0xff, 0xff]);
        assert!(matches!(res, Err(Error::Codec(_))));
    }
}
