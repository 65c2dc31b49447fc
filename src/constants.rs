/// Default allocation granule for buffered pages - one filesystem block.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
