//! Permission bitmask carried by every [`Role`](super::Role).
//!
//! Each capability is a bit in an 8-bit integer, administrators hold all of them.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct Permission(i64);

impl Permission {
    pub const NONE: Self = Self(0);
    pub const DELIVER_CARPOOL: Self = Self(0x01);
    pub const JOIN_CARPOOL: Self = Self(0x02);
    pub const GIVE_RIDE: Self = Self(0x04);
    pub const TAKE_RIDE: Self = Self(0x08);
    pub const ADMINISTER: Self = Self(0xff);

    const NAMED: [(Self, &'static str); 4] = [
        (Self::DELIVER_CARPOOL, "deliver_carpool"),
        (Self::JOIN_CARPOOL, "join_carpool"),
        (Self::GIVE_RIDE, "give_ride"),
        (Self::TAKE_RIDE, "take_ride"),
    ];

    pub const fn from_bits(bits: i64) -> Self {
        Self(bits & 0xff)
    }

    pub const fn bits(self) -> i64 {
        self.0
    }

    /// Checks if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for Permission {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::ADMINISTER) {
            return write!(f, "[administer]");
        }
        f.debug_list()
            .entries(
                Self::NAMED
                    .iter()
                    .filter(|(flag, _)| self.contains(*flag))
                    .map(|(_, name)| name),
            )
            .finish()
    }
}
