use crate::error::{Result, SrunxError};
use crate::proto::AllocatableResource;

/// Resources requested for one interactive task.
///
/// Swap is not budgeted separately: `memory_sw_limit_bytes` always equals
/// `memory_limit_bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub partition_name: String,
    pub cpu_core_limit: u32,
    pub memory_limit_bytes: u64,
    pub memory_sw_limit_bytes: u64,
}

impl ResourceDescriptor {
    pub fn new(
        partition_name: impl Into<String>,
        cpu_core_limit: u32,
        memory_limit_bytes: u64,
    ) -> Result<Self> {
        let partition_name = partition_name.into();
        if partition_name.trim().is_empty() {
            return Err(SrunxError::InvalidArgument(
                "partition name cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            partition_name,
            cpu_core_limit,
            memory_limit_bytes,
            memory_sw_limit_bytes: memory_limit_bytes,
        })
    }

    pub fn to_proto(&self) -> AllocatableResource {
        AllocatableResource {
            cpu_core_limit: self.cpu_core_limit,
            memory_limit_bytes: self.memory_limit_bytes,
            memory_sw_limit_bytes: self.memory_sw_limit_bytes,
        }
    }
}

/// Parse a memory size such as `512M` or `4G` into bytes.
///
/// Accepted units are `B`, `K`, `M` and `G`, all powers of 1024.
pub fn parse_memory(input: &str) -> std::result::Result<u64, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in {:?}, expected \\d+[BKMG]", input))?;
    let (digits, unit) = input.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid memory size {:?}, expected \\d+[BKMG]", input))?;
    let multiplier: u64 = match unit {
        "B" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        _ => return Err(format!("unknown unit {:?}, expected one of B, K, M, G", unit)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("memory size {:?} overflows", input))
}

/// Parse a time limit given as seconds, `MM:SS` or `HH:MM:SS`.
pub fn parse_time_limit(input: &str) -> std::result::Result<u64, String> {
    let parts: Vec<&str> = input.trim().split(':').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(format!(
            "invalid time limit {:?}, expected SECONDS, MM:SS or HH:MM:SS",
            input
        ));
    }

    let mut seconds: u64 = 0;
    for (i, part) in parts.iter().enumerate() {
        let value: u64 = part
            .parse()
            .map_err(|_| format!("invalid time limit component {:?}", part))?;
        // Minutes and seconds must be < 60 once a larger unit precedes them.
        if i > 0 && value >= 60 {
            return Err(format!("time limit component {:?} out of range", part));
        }
        seconds = seconds
            .checked_mul(60)
            .and_then(|s| s.checked_add(value))
            .ok_or_else(|| format!("time limit {:?} overflows", input))?;
    }

    if seconds == 0 {
        return Err("time limit must be positive".to_string());
    }
    Ok(seconds)
}
