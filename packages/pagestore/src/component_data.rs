//! Containers for component data.
//!
//! Used when creating or updating entities individually. Payloads are raw
//! bytes; each must be exactly as long as the stride of the stream it targets.

use std::mem::size_of;

use crate::mask::ComponentTypeId;

/// The bytes to write into one sub-stream of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamUpdate<'a> {
    pub stream: u8,
    pub data: &'a [u8],
}

impl<'a> StreamUpdate<'a> {
    /// Create an update for sub-stream `stream`.
    pub fn new(stream: u8, data: &'a [u8]) -> StreamUpdate<'a> {
        StreamUpdate { stream, data }
    }

    /// View a plain value as the payload for sub-stream `stream`.
    ///
    /// `T` should contain no padding, otherwise uninitialised bytes are
    /// copied into the store.
    pub fn from_value<T: Copy>(stream: u8, value: &'a T) -> StreamUpdate<'a> {
        let data = unsafe {
            std::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>())
        };
        StreamUpdate { stream, data }
    }
}

/// New values for some of the streams of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentUpdate<'a> {
    pub component: ComponentTypeId,
    pub streams: Vec<StreamUpdate<'a>>,
}

impl<'a> ComponentUpdate<'a> {
    /// An update that touches no streams.
    ///
    /// On entity creation this still adds the component to the entity's mask.
    pub fn new(component: ComponentTypeId) -> ComponentUpdate<'a> {
        ComponentUpdate {
            component,
            streams: Vec::new(),
        }
    }

    /// Add a stream payload to this update.
    pub fn with_stream(mut self, stream: u8, data: &'a [u8]) -> ComponentUpdate<'a> {
        self.streams.push(StreamUpdate::new(stream, data));
        self
    }

    /// An update for a component stored in a single stream.
    pub fn monostream(component: ComponentTypeId, data: &'a [u8]) -> ComponentUpdate<'a> {
        ComponentUpdate::new(component).with_stream(0, data)
    }

    /// A single-stream update holding a plain value.
    pub fn from_value<T: Copy>(component: ComponentTypeId, value: &'a T) -> ComponentUpdate<'a> {
        ComponentUpdate {
            component,
            streams: vec![StreamUpdate::from_value(0, value)],
        }
    }
}

/// Everything needed to create an entity.
///
/// The entity's archetype is the one whose mask equals the set of components
/// listed here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityParams<'a> {
    pub name: Option<&'a str>,
    pub components: Vec<ComponentUpdate<'a>>,
}

impl<'a> EntityParams<'a> {
    /// Create empty parameters.
    pub fn new() -> EntityParams<'a> {
        EntityParams::default()
    }

    /// Give the entity a debug name.
    pub fn named(mut self, name: &'a str) -> EntityParams<'a> {
        self.name = Some(name);
        self
    }

    /// Add a component and its initial values.
    pub fn with(mut self, component: ComponentUpdate<'a>) -> EntityParams<'a> {
        self.components.push(component);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_value() {
        let value = 0x0403_0201u32.to_le();
        let update = StreamUpdate::from_value(1, &value);
        assert_eq!(update.stream, 1);
        assert_eq!(update.data, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_builders() {
        let pos = [1u8; 8];
        let vel = [2u8; 4];
        let params = EntityParams::new()
            .named("ship")
            .with(ComponentUpdate::monostream(ComponentTypeId::new(0), &pos))
            .with(ComponentUpdate::new(ComponentTypeId::new(3))
                .with_stream(0, &vel)
                .with_stream(1, &pos));

        assert_eq!(params.name, Some("ship"));
        assert_eq!(params.components.len(), 2);
        assert_eq!(params.components[0].streams, vec![StreamUpdate::new(0, &pos)]);
        assert_eq!(params.components[1].streams[1].stream, 1);
    }
}
