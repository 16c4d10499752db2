use bitfield_struct::bitfield;

/// A single cell of chunk data. Type 0 is air.
#[bitfield(u16, hash = true)]
pub struct Block {
    #[bits(12)]
    pub block_type: u16,
    #[bits(4)]
    pub state: u8,
}

impl Block {
    pub const fn from_type(block_type: u16) -> Self {
        Block::new().with_block_type(block_type)
    }

    pub const fn from_type_state(block_type: u16, state: u8) -> Self {
        Block::new()
            .with_block_type(block_type)
            .with_state(state)
    }

    pub const AIR: Block = Block::new();
    pub const STONE: Block = Block::from_type(1);
    pub const DIRT: Block = Block::from_type(2);
    pub const GRASS: Block = Block::from_type(3);

    pub const fn is_air(&self) -> bool {
        self.block_type() == 0
    }

    pub const fn is_transparent(&self) -> bool {
        // TODO: Look this up from a block registry once glass and water exist
        self.is_air()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.into_bits() == other.into_bits()
    }
}

impl Eq for Block {}
