use recordkit_core::FieldValue;
use recordkit_engine::{Entity, EngineError, RelationCache};
use recordkit_harness::TestContext;
use recordkit_harness::domain::{Customer, StandardInvoice};

#[test]
fn repeated_lookups_query_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = TestContext::new()?;
    let id = ctx.seed_customer(20, "Acme")?;
    let mut cache = RelationCache::new(&ctx.store, &ctx.registry, &ctx.uow);

    let first = cache.get_by_id(id)?;
    let second = cache.get_by_id(id)?;
    assert!(first.is::<Customer>());
    assert_eq!(first.id(), second.id());
    assert_eq!(ctx.store.query_count(), 1);
    Ok(())
}

#[test]
fn warm_loads_related_records_in_one_query() -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = TestContext::new()?;
    let a = ctx.seed_customer(21, "Acme")?;
    let b = ctx.seed_customer(22, "Globex")?;
    let c = ctx.seed_invoice(23, StandardInvoice::KIND, "Draft", None)?;
    let mut cache = RelationCache::new(&ctx.store, &ctx.registry, &ctx.uow);

    assert_eq!(cache.warm([a, b, c])?, 3);
    assert_eq!(ctx.store.query_count(), 1);
    assert!(cache.get_by_id(c)?.is::<StandardInvoice>());
    assert!(cache.get_by_id(b)?.is::<Customer>());
    assert_eq!(ctx.store.query_count(), 1);
    Ok(())
}

#[test]
fn invalidate_forces_a_fresh_read() -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = TestContext::new()?;
    let id = ctx.seed_customer(24, "Acme")?;
    {
        let mut cache = RelationCache::new(&ctx.store, &ctx.registry, &ctx.uow);
        let mut customer = cache.get_by_id(id)?;
        customer.set("name", "Acme Ltd".into())?;
    }
    assert!(ctx.commit().is_clean());

    let mut cache = RelationCache::new(&ctx.store, &ctx.registry, &ctx.uow);
    cache.warm([id])?;
    assert!(cache.invalidate(id));
    assert!(!cache.invalidate(id));
    assert_eq!(cache.get_by_id(id)?.get("name")?, FieldValue::from("Acme Ltd"));
    Ok(())
}

#[test]
fn missing_identity_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = TestContext::new()?;
    let mut cache = RelationCache::new(&ctx.store, &ctx.registry, &ctx.uow);
    let missing = recordkit_core::RecordId::new(404);
    assert!(matches!(cache.get_by_id(missing), Err(EngineError::RecordNotFound(_))));
    assert!(cache.is_empty());
    Ok(())
}
