//! Component type identifiers and the masks built from them.
//!
//! A `ComponentMask` is the identity of an archetype: two archetypes never
//! share a mask. Queries match archetypes whose mask contains the query's.

use std::fmt::{self, Debug, Display, Formatter};

use bit_vec::BitVec;

use crate::error::{StoreError, StoreResult};

/// Identifies a kind of component.
///
/// IDs are handed out by the host application; the store only requires that
/// they are smaller than `StoreConfig::max_component_types`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeId(pub u32);

impl ComponentTypeId {
    /// Construct a `ComponentTypeId` from the raw value.
    pub const fn new(id: u32) -> ComponentTypeId {
        ComponentTypeId(id)
    }

    /// Return the inner value as an index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for ComponentTypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A fixed-width set of component types.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ComponentMask {
    bits: BitVec,
}

impl ComponentMask {
    /// Create a mask with room for `width` component types and none set.
    pub fn empty(width: usize) -> ComponentMask {
        ComponentMask {
            bits: BitVec::from_elem(width, false),
        }
    }

    /// Create a mask from a list of component types.
    ///
    /// Repeated types are folded into one bit.
    pub fn from_components<I>(width: usize, components: I) -> StoreResult<ComponentMask>
        where I: IntoIterator<Item=ComponentTypeId>
    {
        let mut mask = ComponentMask::empty(width);
        for component in components {
            mask.insert(component)?;
        }
        Ok(mask)
    }

    /// Return the number of component types this mask can describe.
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Add a component type, returning false if it was already present.
    pub fn insert(&mut self, component: ComponentTypeId) -> StoreResult<bool> {
        let index = component.index();
        if index >= self.bits.len() {
            return Err(StoreError::InvalidComponentType {
                component,
                max: self.bits.len(),
            });
        }

        let was_set = self.bits[index];
        self.bits.set(index, true);
        Ok(!was_set)
    }

    /// Returns true if this mask includes the given component type.
    pub fn contains(&self, component: ComponentTypeId) -> bool {
        self.bits.get(component.index()).unwrap_or(false)
    }

    /// Returns true if every component type in `other` is also in this mask.
    pub fn contains_all(&self, other: &ComponentMask) -> bool {
        let ours = self.bits.storage();
        let theirs = other.bits.storage();

        theirs.iter().enumerate().all(|(idx, block)| {
            let our_block = ours.get(idx).copied().unwrap_or(0);
            block & our_block == *block
        })
    }

    /// Return the number of component types in this mask.
    pub fn len(&self) -> usize {
        self.bits.storage().iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Returns true if no component types are set.
    pub fn is_empty(&self) -> bool {
        self.bits.none()
    }

    /// Iterate over the component types in this mask in ascending order.
    pub fn iter(&self) -> impl Iterator<Item=ComponentTypeId> + '_ {
        self.bits.iter()
            .enumerate()
            .filter(|(_, set)| *set)
            .map(|(idx, _)| ComponentTypeId(idx as u32))
    }
}

impl Display for ComponentMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, component) in self.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", component)?;
        }
        write!(f, "}}")
    }
}

impl Debug for ComponentMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentMask{}", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mask(ids: &[u32]) -> ComponentMask {
        ComponentMask::from_components(70, ids.iter().copied().map(ComponentTypeId)).unwrap()
    }

    #[test]
    fn test_insert_and_contains() {
        let mut m = ComponentMask::empty(8);
        assert!(m.is_empty());
        assert_eq!(m.insert(ComponentTypeId(3)), Ok(true));
        assert_eq!(m.insert(ComponentTypeId(3)), Ok(false));
        assert!(m.contains(ComponentTypeId(3)));
        assert!(!m.contains(ComponentTypeId(2)));
        assert!(!m.contains(ComponentTypeId(100)));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let mut m = ComponentMask::empty(8);
        assert_eq!(
            m.insert(ComponentTypeId(8)),
            Err(StoreError::InvalidComponentType { component: ComponentTypeId(8), max: 8 }));
    }

    #[test]
    fn test_superset() {
        let abc = mask(&[0, 1, 2]);
        let ab = mask(&[0, 1]);
        let a = mask(&[0]);
        let high = mask(&[1, 65]);

        assert!(abc.contains_all(&ab));
        assert!(abc.contains_all(&abc));
        assert!(!a.contains_all(&ab));
        assert!(ab.contains_all(&mask(&[])));
        assert!(!abc.contains_all(&high));
        assert!(mask(&[1, 2, 65]).contains_all(&high));
    }

    #[test]
    fn test_equality_ignores_order() {
        assert_eq!(mask(&[5, 1, 64]), mask(&[64, 5, 1, 1]));
        assert_ne!(mask(&[5]), mask(&[5, 6]));
    }

    #[test]
    fn test_display() {
        assert_eq!(mask(&[2, 0]).to_string(), "{#0, #2}");
        assert_eq!(mask(&[]).to_string(), "{}");
        assert_eq!(mask(&[0, 2]).iter().collect::<Vec<_>>(),
                   vec![ComponentTypeId(0), ComponentTypeId(2)]);
    }
}
