use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a plant in a stand.
///
/// This is an index into the simulation's plant list, and matches the
/// index of the plant position in [`crate::stand::StandLayout::positions`].
pub type PlantId = usize;

/// Identifier for an axis inside one plant arena
/// ([`crate::topology::PlantTopology::axes`]).
pub type AxisId = usize;

/// Identifier for a metamer inside one plant arena.
pub type MetamerId = usize;

/// Identifier for an organ inside one plant arena.
pub type OrganId = usize;

/// Accumulated thermal time in degree-days (°C·day) since sowing.
pub type ThermalTime = f64;

/// Organ variants carried by a metamer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganKind {
    Internode,
    Sheath,
    Blade,
    Ear,
}

impl OrganKind {
    pub const ALL: [OrganKind; 4] = [
        OrganKind::Internode,
        OrganKind::Sheath,
        OrganKind::Blade,
        OrganKind::Ear,
    ];

    /// Stable numeric tag used when deriving random streams.
    pub fn tag(self) -> u64 {
        match self {
            OrganKind::Internode => 1,
            OrganKind::Sheath => 2,
            OrganKind::Blade => 3,
            OrganKind::Ear => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OrganKind::Internode => "internode",
            OrganKind::Sheath => "sheath",
            OrganKind::Blade => "blade",
            OrganKind::Ear => "ear",
        }
    }
}

/// Botanical address of an axis: the bud ranks followed from the main stem.
///
/// The main stem has an empty path. `T3` (the tiller in the axil of leaf 3
/// of the main stem) is `[3]`, and `T3.1` is `[3, 1]`. Unlike an
/// [`AxisId`], the key does not depend on creation order, so it is used
/// to derive random streams.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AxisKey(pub Vec<u32>);

impl AxisKey {
    pub fn main_stem() -> Self {
        Self(Vec::new())
    }

    /// Key of the tiller emitted by the bud at `rank` on this axis.
    pub fn child(&self, rank: u32) -> Self {
        let mut path = self.0.clone();
        path.push(rank);
        Self(path)
    }

    /// Branching order: 0 for the main stem, 1 for primary tillers, ...
    pub fn order(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn is_main_stem(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AxisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "MS");
        }
        write!(f, "T")?;
        for (i, rank) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{rank}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_key_labels_follow_bud_path() {
        let ms = AxisKey::main_stem();
        assert_eq!(ms.to_string(), "MS");
        assert_eq!(ms.order(), 0);

        let t3 = ms.child(3);
        assert_eq!(t3.to_string(), "T3");
        assert_eq!(t3.order(), 1);

        let t31 = t3.child(1);
        assert_eq!(t31.to_string(), "T3.1");
        assert_eq!(t31.order(), 2);
        assert!(!t31.is_main_stem());
    }
}
