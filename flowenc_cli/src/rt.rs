//! Real-time scheduling for the encoder loop (Linux SCHED_FIFO / affinity /
//! mlockall; macOS mlockall only).
//!
//! Every step is best-effort: a failure is logged and the loop still runs,
//! just with more jitter on A/B/Z.

use crate::cli::{RtArgs, RtLock};

/// Apply real-time settings once per process. No-op unless `--rt` was given.
pub fn setup_once(args: &RtArgs) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !args.rt {
        return;
    }
    let lock = args.rt_lock.unwrap_or_else(RtLock::os_default);
    RT_ONCE.get_or_init(|| {
        match lock_memory(lock) {
            Ok(()) => tracing::info!(mode = ?lock, "rt: memory lock applied"),
            Err(err) => tracing::warn!(mode = ?lock, error = %err, "rt: mlockall failed"),
        }
        platform::apply_scheduling(args.rt_prio, args.rt_cpu);
    });
}

fn mlockall_flags(flags: libc::c_int) -> std::io::Result<()> {
    // SAFETY: mlockall takes plain flags and touches no Rust-managed memory.
    let rc = unsafe { libc::mlockall(flags) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn is_memlock_denied(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
}

/// Lock pages per `lock`; `All` falls back to `Current` when denied.
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    let err = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => match mlockall_flags(libc::MCL_CURRENT) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        },
        RtLock::All => match mlockall_flags(libc::MCL_CURRENT | libc::MCL_FUTURE) {
            Ok(()) => return Ok(()),
            Err(e) if is_memlock_denied(&e) => match mlockall_flags(libc::MCL_CURRENT) {
                Ok(()) => {
                    tracing::warn!(error = %e, "rt: mlockall(current|future) denied; locked current pages only");
                    return Ok(());
                }
                Err(e2) => e2,
            },
            Err(e) => e,
        },
    };

    let mut msg = format!("mlockall failed: {err}");
    if is_memlock_denied(&err) {
        if let Some(limit) = memlock_limit_kib() {
            msg.push_str(&format!("; memlock limit: {limit}"));
        }
        msg.push_str("; needs CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'");
    }
    Err(eyre::eyre!(msg))
}

fn memlock_limit_kib() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit writes a full rlimit into the pointer on success.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 means the struct was initialised.
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    if cur == libc::RLIM_INFINITY {
        Some("unlimited".to_string())
    } else {
        Some(format!("{} KiB", cur / 1024))
    }
}

#[cfg(target_os = "linux")]
mod platform {
    /// Capacity of cpu_set_t in CPU indices (bits).
    const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;
    const CAP_SYS_NICE: u64 = 1 << 23;

    pub fn apply_scheduling(prio: Option<i32>, cpu: Option<usize>) {
        match set_fifo(prio) {
            Ok(p) => tracing::info!(priority = p, "rt: SCHED_FIFO applied"),
            Err(err) => tracing::warn!(error = %err, "rt: SCHED_FIFO not applied"),
        }
        let target = cpu.unwrap_or(0);
        match pin_to_cpu(target) {
            Ok(()) => tracing::info!(cpu = target, "rt: affinity applied"),
            Err(err) => tracing::warn!(cpu = target, error = %err, "rt: affinity not applied"),
        }
    }

    fn has_sys_nice() -> bool {
        let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
            // Unknown; let sched_setscheduler decide.
            return true;
        };
        status
            .lines()
            .filter(|l| l.starts_with("CapEff:"))
            .filter_map(|l| l.split_whitespace().nth(1))
            .filter_map(|hex| u64::from_str_radix(hex, 16).ok())
            .any(|caps| caps & CAP_SYS_NICE != 0)
    }

    fn set_fifo(prio: Option<i32>) -> eyre::Result<i32> {
        // SAFETY: geteuid has no preconditions.
        let euid = unsafe { libc::geteuid() };
        if euid != 0 && !has_sys_nice() {
            eyre::bail!(
                "needs CAP_SYS_NICE or root (euid {euid}); try 'sudo setcap cap_sys_nice=ep /path/to/flowenc'"
            );
        }
        // SAFETY: plain queries on a valid policy constant.
        let (min, max) = unsafe {
            (
                libc::sched_get_priority_min(libc::SCHED_FIFO),
                libc::sched_get_priority_max(libc::SCHED_FIFO),
            )
        };
        let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
        let p = prio.unwrap_or(max).clamp(min, max);
        let param = libc::sched_param { sched_priority: p };
        // SAFETY: param outlives the call; pid 0 is the calling thread.
        let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
        if rc != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        Ok(p)
    }

    fn pin_to_cpu(target: usize) -> eyre::Result<()> {
        if target >= MAX_CPUSET_BITS {
            eyre::bail!("CPU {target} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        // SAFETY: sysconf has no preconditions.
        let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if online < 1 {
            eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
        }
        if target as libc::c_long >= online {
            eyre::bail!("CPU {target} >= online CPUs {online}");
        }
        // SAFETY: cpu_set_t is plain data; zeroed is a valid empty set and
        // sched_getaffinity fills at most size_of::<cpu_set_t>() bytes.
        let allowed = unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
                return Err(eyre::eyre!(std::io::Error::last_os_error()));
            }
            libc::CPU_ISSET(target, &set)
        };
        if !allowed {
            eyre::bail!("CPU {target} not permitted by current affinity mask");
        }
        // SAFETY: as above; target < MAX_CPUSET_BITS was checked.
        let rc = unsafe {
            let mut desired: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut desired);
            libc::CPU_SET(target, &mut desired);
            libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &desired)
        };
        if rc != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    pub fn apply_scheduling(prio: Option<i32>, cpu: Option<usize>) {
        tracing::warn!(
            ?prio,
            ?cpu,
            "rt: SCHED_FIFO and affinity unavailable on this OS; only mlockall applied"
        );
    }
}
