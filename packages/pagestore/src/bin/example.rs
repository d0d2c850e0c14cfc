use pagestore::{
    ArchetypeLayout,
    ComponentLayout,
    ComponentTypeId,
    ComponentUpdate,
    EntityHandle,
    EntityParams,
    EntityStore,
    StoreConfig,
    World,
};

const POSITION: ComponentTypeId = ComponentTypeId::new(0);
const VELOCITY: ComponentTypeId = ComponentTypeId::new(1);
const MASS: ComponentTypeId = ComponentTypeId::new(2);

const TIME_STEP: f32 = 0.5;
const NUM_STEPS: usize = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct Position(f32, f32);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct Velocity(f32, f32);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct Mass(f32);

fn populate(store: &mut EntityStore) -> Result<(), pagestore::StoreError> {
    store.create_archetype(&ArchetypeLayout::new()
        .with(ComponentLayout::of::<Position>(POSITION))
        .with(ComponentLayout::of::<Velocity>(VELOCITY)))?;
    store.create_archetype(&ArchetypeLayout::new()
        .with(ComponentLayout::of::<Position>(POSITION))
        .with(ComponentLayout::of::<Velocity>(VELOCITY))
        .with(ComponentLayout::of::<Mass>(MASS)))?;

    for i in 0..3 {
        let x = i as f32;
        let position = Position(x, 0.0);
        let velocity = Velocity(0.0, 1.0 + x);
        let name = format!("comet-{}", i);
        store.create_entity(&EntityParams::new()
            .named(&name)
            .with(ComponentUpdate::from_value(POSITION, &position))
            .with(ComponentUpdate::from_value(VELOCITY, &velocity)))?;
    }

    for i in 0..2 {
        let y = i as f32;
        let position = Position(0.0, y);
        let velocity = Velocity(-1.0, 0.0);
        let mass = Mass(10.0 + y);
        let name = format!("planet-{}", i);
        store.create_entity(&EntityParams::new()
            .named(&name)
            .with(ComponentUpdate::from_value(POSITION, &position))
            .with(ComponentUpdate::from_value(VELOCITY, &velocity))
            .with(ComponentUpdate::from_value(MASS, &mass)))?;
    }

    Ok(())
}

fn apply_velocity(store: &mut EntityStore) -> Result<(), pagestore::StoreError> {
    let moved: Vec<(EntityHandle, Position)> = {
        let result = store.query(&[POSITION, VELOCITY])?;
        let positions = result.component(POSITION).and_then(|c| c.stream(0));
        let velocities = result.component(VELOCITY).and_then(|c| c.stream(0));
        let (positions, velocities) = match (positions, velocities) {
            (Some(p), Some(v)) => (p, v),
            _ => return Ok(()),
        };

        let positions = positions.pages().iter().flat_map(|page| unsafe { page.cast::<Position>() });
        let velocities = velocities.pages().iter().flat_map(|page| unsafe { page.cast::<Velocity>() });

        result.entity_handles()
            .zip(positions.zip(velocities))
            .map(|(id, (&Position(x, y), &Velocity(vx, vy)))| {
                (id, Position(x + TIME_STEP * vx, y + TIME_STEP * vy))
            })
            .collect()
    };

    for (id, position) in moved.iter() {
        store.update_entity(*id, &[ComponentUpdate::from_value(POSITION, position)])?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    runtime.block_on(async {
        let world = World::new(EntityStore::new(StoreConfig::default())?);
        world.transaction(populate).await??;

        for _ in 0..NUM_STEPS {
            world.transaction(apply_velocity).await??;
        }

        let report = world.read(|store| -> Result<Vec<String>, pagestore::StoreError> {
            let result = store.query(&[POSITION])?;
            let positions = result.component(POSITION).and_then(|c| c.stream(0));
            let positions = positions.iter()
                .flat_map(|s| s.pages().iter())
                .flat_map(|page| unsafe { page.cast::<Position>() });

            Ok(result.entity_handles()
                .zip(positions)
                .map(|(id, Position(x, y))| {
                    let name = store.entity_name(id).unwrap_or("?");
                    format!("{:>10} {:<8} ({:6.2}, {:6.2})", name, id.to_string(), x, y)
                })
                .collect())
        }).await??;

        for line in report {
            println!("{}", line);
        }

        let store = world.into_store().await?;
        println!("{:?}", store.page_stats());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
