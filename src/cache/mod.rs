pub(crate) mod result_cache;
