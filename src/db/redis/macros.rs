/// Serves a value from the TTL cache, or computes and caches it.
///
/// On a hit the cached value is returned as `Ok`. On a miss the block is
/// awaited, its error propagated with `?`, and the fresh value written back
/// before being returned.
///
/// # Arguments
/// * `$cache`: a `TtlCache` (anything with async `get(&key, ttl)` and `set(&key, &value)`).
/// * `$key`: the `CacheKey`; its namespace decides the TTL.
/// * `$block`: a future yielding `AppResult<T>`, only awaited on a miss.
///
/// # Example
/// ```rust,ignore
/// let metadata = cached!(self.cache, key, async move {
///     self.inner.fetch_metadata(id, media_type).await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        if let Some(cached) = $cache.get(&$key, None).await {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set(&$key, &value).await;
            Ok(value)
        }
    }};
}
