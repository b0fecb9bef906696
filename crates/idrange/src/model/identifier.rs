use core::{fmt, str::FromStr};

use crate::{BatchId, Error, OwnerId, PublicationId};

/// Format of the publication an identifier is assigned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum PublicationType {
    PrintHardback,
    PrintPaperback,
    PrintSpiralBinding,
    PrintOther,
    ElectronicPdf,
    ElectronicEpub,
    ElectronicCdRom,
    ElectronicMp3,
    ElectronicOther,
}

impl PublicationType {
    pub const ALL: [Self; 9] = [
        Self::PrintHardback,
        Self::PrintPaperback,
        Self::PrintSpiralBinding,
        Self::PrintOther,
        Self::ElectronicPdf,
        Self::ElectronicEpub,
        Self::ElectronicCdRom,
        Self::ElectronicMp3,
        Self::ElectronicOther,
    ];

    pub const fn is_print(self) -> bool {
        matches!(
            self,
            Self::PrintHardback | Self::PrintPaperback | Self::PrintSpiralBinding | Self::PrintOther
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrintHardback => "PRINT_HARDBACK",
            Self::PrintPaperback => "PRINT_PAPERBACK",
            Self::PrintSpiralBinding => "PRINT_SPIRAL_BINDING",
            Self::PrintOther => "PRINT_OTHER",
            Self::ElectronicPdf => "ELECTRONIC_PDF",
            Self::ElectronicEpub => "ELECTRONIC_EPUB",
            Self::ElectronicCdRom => "ELECTRONIC_CD_ROM",
            Self::ElectronicMp3 => "ELECTRONIC_MP3",
            Self::ElectronicOther => "ELECTRONIC_OTHER",
        }
    }
}

impl fmt::Display for PublicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| Error::InvalidFormat {
                value: s.to_owned(),
                reason: "unknown publication type",
            })
    }
}

/// A live identifier row. Immutable once issued; removed only by
/// cancellation or batch deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IssuedIdentifier {
    pub value: String,
    pub owner: OwnerId,
    /// The numeric item segment, in the owner's interval.
    pub item: u32,
    pub publication: PublicationId,
    pub publication_type: Option<PublicationType>,
    pub batch: BatchId,
    /// Taken from the reuse pool rather than minted.
    pub reused: bool,
}

/// Why an identifier ended up in a reuse pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CancelOrigin {
    /// Cancelled one by one; counted in `canceled`.
    Canceled,
    /// Returned by a batch or subrange deletion; counted in `deleted`.
    Deleted,
}

/// Marks a pool entry as reissued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReuseRecord {
    /// The batch that reissued it; `None` for publisher identifiers reused
    /// by a subrange grant.
    pub batch: Option<BatchId>,
    pub used_at: u64,
}

/// A reuse pool entry.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanceledIdentifier {
    pub value: String,
    pub item: u32,
    pub owner: OwnerId,
    pub category: Option<u8>,
    /// Who cancelled it; `None` when it came back through a deletion.
    pub canceled_by: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub canceled_at: u64,
    pub origin: CancelOrigin,
    pub reuse: Option<ReuseRecord>,
}

impl CanceledIdentifier {
    pub const fn is_available(&self) -> bool {
        self.reuse.is_none()
    }
}
