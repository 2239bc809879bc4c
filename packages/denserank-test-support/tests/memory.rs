use denserank_core::MemoryStore;

#[test]
fn memory_store_passes_the_conformance_suite() {
    denserank_test_support::run_conformance(&MemoryStore::new);
}
