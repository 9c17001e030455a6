/// A macro to simplify best-effort caching around an expensive computation.
///
/// This macro checks if a fresh value is present in the cache.
/// If found, it evaluates to `Ok(cached)`.
/// If not found, it awaits the provided block, propagating its error,
/// stores the computed value in the cache, and evaluates to `Ok(value)`.
/// Cache failures on either side count as a miss and never surface.
///
/// # Arguments
/// * `$cache`: The cache instance. It must have `get_from_cache` and `set_in_cache` methods.
/// * `$key`: The key to use for caching the value.
/// * `$ttl`: The time-to-live (TTL) for the cached value in seconds.
/// * `$block`: The future to await if the value is not found in cache.
///
/// # Example
/// ```rust,ignore
/// let pool: CandidatePool = cached!(cache, key, 1800, async {
///     build_pool().await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await {
            Ok::<_, $crate::error::AppError>(cached)
        } else {
            match $block.await {
                Ok(value) => {
                    $cache.set_in_cache(&$key, &value, $ttl).await;
                    Ok(value)
                }
                Err(e) => Err(e),
            }
        }
    }};
}
