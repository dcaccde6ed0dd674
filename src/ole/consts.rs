/// Magic bytes that should be at the beginning of every OLE file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 512;

/// Size of a directory entry in bytes
pub const DIRENTRY_SIZE: usize = 128;

/// Sector size for version 3 (512 bytes)
pub const SECTOR_SIZE_V3: usize = 512;

/// Sector shift for version 3 (2^9 = 512)
pub const SECTOR_SHIFT_V3: u16 = 9;

/// Mini sector size (64 bytes)
pub const MINI_SECTOR_SIZE: usize = 64;

/// Mini sector shift (2^6 = 64)
pub const MINI_SECTOR_SHIFT: u16 = 6;

/// Streams strictly smaller than this many bytes live in the mini stream
pub const MINI_STREAM_CUTOFF: u32 = 4096;

/// Header minor version
pub const MINOR_VERSION: u16 = 0x003E;

/// Header major version for 512-byte sectors
pub const MAJOR_VERSION_V3: u16 = 3;

/// Byte order mark as stored little-endian (0xFFFE)
pub const BYTE_ORDER_MARK: u16 = 0xFFFE;

/// Number of SAT sector references embedded in the header
pub const HEADER_MSAT_ENTRIES: usize = 109;

/// Offset of the first embedded SAT sector reference in the header
pub const HEADER_MSAT_OFFSET: usize = 76;

// Sector IDs (from AAF specifications)
/// Maximum regular sector ID
pub const MAXREGSECT: u32 = 0xFFFFFFFA; // -6
/// Denotes a DIFAT (MSAT) sector in a FAT
pub const DIFSECT: u32 = 0xFFFFFFFC; // -4
/// Denotes a FAT sector in a FAT
pub const FATSECT: u32 = 0xFFFFFFFD; // -3
/// End of a virtual stream chain
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE; // -2
/// Unallocated sector
pub const FREESECT: u32 = 0xFFFFFFFF; // -1

// Directory Entry IDs (from AAF specifications)
/// Maximum directory entry ID
pub const MAXREGSID: u32 = 0xFFFFFFFA; // -6
/// Unallocated directory entry
pub const NOSTREAM: u32 = 0xFFFFFFFF; // -1

// Object types in storage (from AAF specifications)
/// Empty directory entry
pub const STGTY_EMPTY: u8 = 0;
/// Element is a storage object
pub const STGTY_STORAGE: u8 = 1;
/// Element is a stream object
pub const STGTY_STREAM: u8 = 2;
/// Element is a root storage
pub const STGTY_ROOT: u8 = 5;

/// Name of the root storage
pub const ROOT_ENTRY_NAME: &str = "Root Entry";

/// Longest entry name in UTF-16 code units (the 64-byte field keeps a NUL)
pub const MAX_NAME_LEN: usize = 31;

/// Size of the name field of a directory entry
pub const NAME_FIELD_SIZE: usize = 64;

/// Fill byte for unused bytes of allocation table sectors
pub const TABLE_FILL: u8 = 0xFF;

/// Fill byte for the tail of the last directory sector
pub const DIRECTORY_FILL: u8 = 0x00;
