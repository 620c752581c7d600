//! Thread-to-core pinning.

/// Pin the calling thread to a physical core. Returns false (and logs) when
/// the platform refuses or the core does not exist; the engine keeps running
/// unpinned in that case.
pub fn pin_current_thread(core: usize) -> bool {
    match core_affinity::get_core_ids() {
        Some(ids) if core < ids.len() => {
            let ok = core_affinity::set_for_current(ids[core]);
            if !ok {
                tracing::warn!(core, "failed to pin thread to core");
            }
            ok
        }
        _ => {
            tracing::warn!(core, "no such core to pin to");
            false
        }
    }
}
