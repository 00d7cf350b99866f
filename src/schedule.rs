//! Round schedule of the binary-tree reduction.
//!
//! Every rank evaluates the same pure state machine, so the schedule is
//! identical on all ranks regardless of whether their local data is usable.
//! For a group of six:
//!
//! ```text
//! rank:    0 1 2 3 4 5      rounds = ceil(log2(6)) = 3
//! k = 0    r s r s r s      r: receive, s: send to the left
//! k = 1    r   s  (r)       (r): receiver without a partner
//! k = 2    r       s
//! ```

/// Communication role of one rank in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Still accumulating; may receive from a partner on the right
    Receive,
    /// Hands its accumulated result to the partner on the left
    Send,
    /// Already sent; takes no further part
    Inactive,
}

/// What a rank does in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Send the accumulated result to this rank
    SendTo(usize),
    /// Block until this rank's message for the round arrives
    ReceiveFrom(usize),
    /// Receiver whose partner would lie beyond the group
    NoPartner,
    /// Inactive rank
    Idle,
}

/// One round of the schedule as seen by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Round index `k`
    pub round: u32,
    /// Role held during this round
    pub role: Role,
    /// Resulting action
    pub action: Action,
}

/// Number of rounds for a group of `size`: `ceil(log2(size))`, zero for one rank.
pub fn round_count(size: usize) -> u32 {
    if size <= 1 {
        0
    } else {
        usize::BITS - (size - 1).leading_zeros()
    }
}

/// Role of `rank` in `round`, given its role in the previous round.
///
/// Every rank starts round 0 with [`Role::Receive`] as the previous role.
pub fn next_role(rank: usize, round: u32, previous: Role) -> Role {
    match previous {
        Role::Send | Role::Inactive => Role::Inactive,
        Role::Receive if (rank >> round) & 1 == 1 => Role::Send,
        Role::Receive => Role::Receive,
    }
}

/// Partner action for `rank` holding `role` in `round` of a group of `size`.
pub fn action(rank: usize, size: usize, round: u32, role: Role) -> Action {
    let stride = 1usize << round;
    match role {
        Role::Send => Action::SendTo(rank - stride),
        Role::Receive => match rank.checked_add(stride) {
            Some(source) if source < size => Action::ReceiveFrom(source),
            _ => Action::NoPartner,
        },
        Role::Inactive => Action::Idle,
    }
}

/// Iterator over every round of the schedule for one rank.
#[derive(Debug, Clone)]
pub struct RoundSchedule {
    rank: usize,
    size: usize,
    rounds: u32,
    next_round: u32,
    role: Role,
}

impl RoundSchedule {
    /// Schedule for `rank` in a group of `size`.
    ///
    /// # Panics
    ///
    /// Panics if `rank >= size`.
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank {rank} out of range for size {size}");
        RoundSchedule {
            rank,
            size,
            rounds: round_count(size),
            next_round: 0,
            role: Role::Receive,
        }
    }

    /// Total number of rounds, identical on every rank.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

impl Iterator for RoundSchedule {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        if self.next_round >= self.rounds {
            return None;
        }
        let round = self.next_round;
        self.next_round += 1;
        self.role = next_role(self.rank, round, self.role);
        Some(Step {
            round,
            role: self.role,
            action: action(self.rank, self.size, round, self.role),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.rounds - self.next_round) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for RoundSchedule {}
