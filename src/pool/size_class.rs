//! Size-class ladder shared by the pool and its thread caches

/// Block sizes the pool rounds requests up to
pub const SIZE_CLASSES: [usize; 10] = [16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192];

pub const NUM_SIZE_CLASSES: usize = SIZE_CLASSES.len();

/// Largest request served from the ladder
pub const MAX_POOLED_SIZE: usize = SIZE_CLASSES[NUM_SIZE_CLASSES - 1];

pub const MIN_OBJECTS_PER_SLAB: usize = 64;
pub const MAX_OBJECTS_PER_SLAB: usize = 1024;

/// Index of the smallest class that fits `size`, or `None` above the ladder.
#[inline]
pub fn size_class_for(size: usize) -> Option<usize> {
    SIZE_CLASSES.iter().position(|&class| size <= class)
}

/// Objects per slab for a class, derived from the configured pool size.
pub fn objects_per_slab(initial_pool_size: usize, class_size: usize) -> usize {
    (initial_pool_size / class_size).clamp(MIN_OBJECTS_PER_SLAB, MAX_OBJECTS_PER_SLAB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_class_boundaries() {
        assert_eq!(size_class_for(0), Some(0));
        assert_eq!(size_class_for(1), Some(0));
        assert_eq!(size_class_for(16), Some(0));
        assert_eq!(size_class_for(17), Some(1));
        assert_eq!(size_class_for(4097), Some(9));
        assert_eq!(size_class_for(8192), Some(9));
        assert_eq!(size_class_for(8193), None);
    }

    #[test]
    fn test_objects_per_slab_is_clamped() {
        // 1MB / 16B = 65536, clamped down
        assert_eq!(objects_per_slab(1024 * 1024, 16), MAX_OBJECTS_PER_SLAB);
        // 1MB / 8KB = 128, inside the range
        assert_eq!(objects_per_slab(1024 * 1024, 8192), 128);
        // tiny pools still get the minimum
        assert_eq!(objects_per_slab(1024, 512), MIN_OBJECTS_PER_SLAB);
    }
}
