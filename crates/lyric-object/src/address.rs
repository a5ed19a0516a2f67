//! Descriptor addresses.
//!
//! Operands and descriptors refer to other descriptors by a `u32` address.
//! A *near* address (high bit clear) is an index into a descriptor table of
//! the same object. A *far* address (high bit set) is an offset into the
//! object's link table, resolved against an imported object at load time.

pub type Address = u32;

pub const INVALID_ADDRESS: Address = 0xFFFF_FFFF;

const FAR_BIT: u32 = 0x8000_0000;

#[inline]
pub fn is_valid(address: Address) -> bool {
    address != INVALID_ADDRESS
}

#[inline]
pub fn is_near(address: Address) -> bool {
    address & FAR_BIT == 0
}

#[inline]
pub fn is_far(address: Address) -> bool {
    is_valid(address) && address & FAR_BIT != 0
}

/// Near address for a descriptor index; `INVALID_ADDRESS` if it does not fit.
#[inline]
pub fn descriptor_address(index: u32) -> Address {
    if index & FAR_BIT == 0 {
        index
    } else {
        INVALID_ADDRESS
    }
}

/// Far address for a link offset; `INVALID_ADDRESS` if it does not fit.
#[inline]
pub fn link_address(offset: u32) -> Address {
    if offset & FAR_BIT == 0 {
        offset | FAR_BIT
    } else {
        INVALID_ADDRESS
    }
}

#[inline]
pub fn descriptor_offset(address: Address) -> Option<u32> {
    is_near(address).then_some(address)
}

#[inline]
pub fn link_offset(address: Address) -> Option<u32> {
    is_far(address).then_some(address & !FAR_BIT)
}
