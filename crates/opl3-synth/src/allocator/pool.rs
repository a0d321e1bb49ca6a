//! Free-channel pools with a fixed priority order.

/// 2-op allocation priority.
///
/// Channels 15-17 have no 4-op partner and go first; 4-op capable pairs
/// stay adjacent; 6-8 come last because percussion mode claims them.
pub const TWO_OP_PRIORITY: [u8; 18] = [
    15, 16, 17, 0, 3, 1, 4, 2, 5, 9, 12, 10, 13, 11, 14, 6, 7, 8,
];

/// 4-op allocation priority (primary channel of each pair).
///
/// Runs opposite to the 2-op order so the two kinds meet in the middle.
pub const FOUR_OP_PRIORITY: [u8; 6] = [11, 10, 9, 2, 1, 0];

/// Set of free channels handed out in a fixed priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPool {
    priority: &'static [u8],
    members: u32,
}

impl ChannelPool {
    /// Empty pool ordered by `priority`
    pub fn new(priority: &'static [u8]) -> Self {
        Self {
            priority,
            members: 0,
        }
    }

    /// Pool holding every channel of `priority`
    pub fn full(priority: &'static [u8]) -> Self {
        let mut pool = Self::new(priority);
        for &channel in priority {
            pool.insert(channel);
        }
        pool
    }

    /// Take the highest-priority free channel
    pub fn pop(&mut self) -> Option<u8> {
        let channel = self.iter().next()?;
        self.members &= !(1 << channel);
        Some(channel)
    }

    /// Return a channel to the pool
    ///
    /// # Returns
    ///
    /// false if the channel does not belong to this pool's priority table
    /// or is already present
    pub fn insert(&mut self, channel: u8) -> bool {
        if !self.priority.contains(&channel) || self.contains(channel) {
            return false;
        }
        self.members |= 1 << channel;
        true
    }

    /// Take a specific channel out of the pool
    pub fn remove(&mut self, channel: u8) -> bool {
        if !self.contains(channel) {
            return false;
        }
        self.members &= !(1 << channel);
        true
    }

    pub fn contains(&self, channel: u8) -> bool {
        channel < 32 && self.members & (1 << channel) != 0
    }

    pub fn len(&self) -> usize {
        self.members.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.members == 0
    }

    pub fn clear(&mut self) {
        self.members = 0;
    }

    /// Free channels in priority order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.priority
            .iter()
            .copied()
            .filter(move |&channel| self.contains(channel))
    }
}
