use crate::graph_instance::GraphInstance;

/// Handle to an instance inside [`GraphInstances`]. Handles of removed instances never alias a
/// later instance stored in the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    instance: Option<GraphInstance>,
}

/// Generational slab of live graph instances, used to reach every instance of a tree when
/// reconfiguring nodes.
#[derive(Debug, Default)]
pub struct GraphInstances {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl GraphInstances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: GraphInstance) -> InstanceId {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.instance = Some(instance);
                InstanceId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    instance: Some(instance),
                });
                InstanceId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    pub fn remove(&mut self, id: InstanceId) -> Option<GraphInstance> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let instance = slot.instance.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(instance)
    }

    pub fn get(&self, id: InstanceId) -> Option<&GraphInstance> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.instance.as_ref())
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut GraphInstance> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.instance.as_mut())
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &GraphInstance)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.instance.as_ref().map(|instance| {
                (
                    InstanceId {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    instance,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (InstanceId, &mut GraphInstance)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.instance.as_mut().map(|instance| {
                (
                    InstanceId {
                        index: i as u32,
                        generation,
                    },
                    instance,
                )
            })
        })
    }

    /// Iterates the instances only, for broadcast helpers.
    pub fn instances_mut(&mut self) -> impl Iterator<Item = &mut GraphInstance> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.instance.as_mut())
    }
}
