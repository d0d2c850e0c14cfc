use std::time::Instant;

use pagestore::{
    ArchetypeLayout,
    ComponentLayout,
    ComponentTypeId,
    ComponentUpdate,
    EntityHandle,
    EntityParams,
    EntityStore,
    StoreConfig,
    StoreError,
};

const NUM_COMPONENTS: u32 = 4;
const DEFAULT_ROUNDS: usize = 200;
const BATCH: usize = 512;

/// A small deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn check_conservation(store: &EntityStore) -> Result<(), Box<dyn std::error::Error>> {
    let stats = store.page_stats();
    if stats.free + stats.assigned != stats.total {
        return Err(format!("page pool leaked: {:?}", stats).into());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let rounds = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => DEFAULT_ROUNDS,
    };

    let config = StoreConfig::default()
        .with_max_entities(BATCH * 4)
        .with_max_component_types(NUM_COMPONENTS as usize)
        .with_max_components_per_archetype(NUM_COMPONENTS as usize)
        .with_pages(4096, 512);
    let mut store = EntityStore::new(config)?;

    // One archetype per non-empty subset of components.
    for subset in 1u32..(1 << NUM_COMPONENTS) {
        let layout = (0..NUM_COMPONENTS)
            .filter(|bit| subset & (1 << bit) != 0)
            .fold(ArchetypeLayout::new(), |layout, id| {
                layout.with(ComponentLayout::new(ComponentTypeId::new(id), 4 * (id as usize + 1)))
            });
        store.create_archetype(&layout)?;
    }

    let mut rng = Lcg(0x5eed);
    let mut live: Vec<EntityHandle> = Vec::new();
    let payload = [0xabu8; 4 * NUM_COMPONENTS as usize];
    let start = Instant::now();
    let mut created = 0usize;
    let mut destroyed = 0usize;

    for round in 0..rounds {
        for _ in 0..BATCH {
            let subset = (rng.next_u64() as u32 % ((1 << NUM_COMPONENTS) - 1)) + 1;
            let params = (0..NUM_COMPONENTS)
                .filter(|bit| subset & (1 << bit) != 0)
                .fold(EntityParams::new(), |params, id| {
                    let stride = 4 * (id as usize + 1);
                    params.with(ComponentUpdate::monostream(ComponentTypeId::new(id), &payload[..stride]))
                });

            match store.create_entity(&params) {
                Ok(entity) => {
                    live.push(entity);
                    created += 1;
                }
                Err(StoreError::EntitiesExhausted) | Err(StoreError::PagesExhausted { .. }) => break,
                Err(err) => return Err(err.into()),
            }
        }

        // Destroy a random half, half of them as one batch.
        let mut doomed = Vec::with_capacity(live.len() / 2);
        for _ in 0..live.len() / 2 {
            let idx = rng.next_u64() as usize % live.len();
            doomed.push(live.swap_remove(idx));
        }

        let (batch, single) = doomed.split_at(doomed.len() / 2);
        store.destroy_entities(batch)?;
        for &entity in single {
            store.destroy_entity(entity)?;
        }
        destroyed += doomed.len();

        for &entity in doomed.iter().take(4) {
            if store.destroy_entity(entity).is_ok() {
                return Err(format!("stale handle {} was accepted", entity).into());
            }
        }

        check_conservation(&store)?;

        let result = store.query(&[ComponentTypeId::new(0)])?;
        log::debug!("round {}: {} live, {} with component #0", round, store.entity_count(), result.len());
    }

    store.destroy_entities(&live)?;
    for subset in 1u32..(1 << NUM_COMPONENTS) {
        let ids: Vec<_> = (0..NUM_COMPONENTS)
            .filter(|bit| subset & (1 << bit) != 0)
            .map(ComponentTypeId::new)
            .collect();
        store.destroy_archetype(&store.mask(&ids)?)?;
    }

    check_conservation(&store)?;
    let stats = store.page_stats();
    if stats.free != stats.total {
        return Err(format!("pages still assigned after teardown: {:?}", stats).into());
    }

    println!("{} rounds: {} created, {} destroyed in {:?}", rounds, created, destroyed, start.elapsed());
    Ok(())
}
