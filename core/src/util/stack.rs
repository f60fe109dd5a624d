/// Runs `f` with at least a red zone of stack left, growing the stack on the
/// heap when it runs low.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    const RED_ZONE: usize = 128 * 1024;
    const GROW_BY: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, GROW_BY, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
