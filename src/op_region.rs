use crate::AmlError;

/// Payload of an `OperationRegion` declaration. This core only records the
/// region; moving bytes in and out of it is the job of a registered
/// [`RegionHandler`].
#[derive(Clone, PartialEq, Debug)]
pub struct OpRegion {
    pub space: RegionSpace,
    pub offset: u64,
    pub length: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum RegionSpace {
    SystemMemory,
    SystemIO,
    PciConfig,
    EmbeddedControl,
    SmBus,
    SystemCmos,
    PciBarTarget,
    Ipmi,
    GeneralPurposeIo,
    GenericSerialBus,
    Pcc,
    Oem(u8),
}

impl From<u8> for RegionSpace {
    fn from(value: u8) -> Self {
        match value {
            0 => RegionSpace::SystemMemory,
            1 => RegionSpace::SystemIO,
            2 => RegionSpace::PciConfig,
            3 => RegionSpace::EmbeddedControl,
            4 => RegionSpace::SmBus,
            5 => RegionSpace::SystemCmos,
            6 => RegionSpace::PciBarTarget,
            7 => RegionSpace::Ipmi,
            8 => RegionSpace::GeneralPurposeIo,
            9 => RegionSpace::GenericSerialBus,
            10 => RegionSpace::Pcc,
            _ => RegionSpace::Oem(value),
        }
    }
}

/// Hook for performing actual reads and writes to an operation region's
/// address space. One handler may be installed per [`RegionSpace`] via
/// `Interpreter::install_region_handler`; the surrounding system drives
/// these from its field-access paths.
pub trait RegionHandler {
    fn read_u8(&self, region: &OpRegion, offset: u64) -> Result<u8, AmlError>;
    fn read_u16(&self, region: &OpRegion, offset: u64) -> Result<u16, AmlError>;
    fn read_u32(&self, region: &OpRegion, offset: u64) -> Result<u32, AmlError>;
    fn read_u64(&self, region: &OpRegion, offset: u64) -> Result<u64, AmlError>;

    fn write_u8(&self, region: &OpRegion, offset: u64, value: u8) -> Result<(), AmlError>;
    fn write_u16(&self, region: &OpRegion, offset: u64, value: u16) -> Result<(), AmlError>;
    fn write_u32(&self, region: &OpRegion, offset: u64, value: u32) -> Result<(), AmlError>;
    fn write_u64(&self, region: &OpRegion, offset: u64, value: u64) -> Result<(), AmlError>;
}
