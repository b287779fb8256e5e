//! Wait-type classification for live session samples.
//!
//! Maps a raw `sys.dm_exec_requests.wait_type` to the SQL Server wait
//! category code and name attached to each sample record. An exact match
//! against the detailed table wins; otherwise prefix rules are tried in a
//! fixed order. The function is total: anything unrecognized lands in
//! `(0, "Unknown")`.

/// Category name for a wait-category code.
#[must_use]
pub fn category_name(code: u32) -> &'static str {
    match code {
        1 => "CPU",
        2 => "Worker Thread",
        3 => "Lock",
        4 => "Latch",
        5 => "Buffer Latch",
        6 => "Buffer IO",
        7 => "Compilation",
        8 => "SQL CLR",
        9 => "Mirroring",
        10 => "Transaction",
        11 => "Idle",
        12 => "Preemptive",
        13 => "Service Broker",
        14 => "Tran Log IO",
        15 => "Network IO",
        16 => "Parallelism",
        17 => "Memory",
        18 => "User Wait",
        19 => "Tracing",
        20 => "Full Text Search",
        21 => "Other Disk IO",
        22 => "Replication",
        23 => "Log Rate Governor",
        _ => "Unknown",
    }
}

/// Exact wait types the prefix rules cannot reach.
fn detailed_code(wait_type: &str) -> Option<u32> {
    let code = match wait_type {
        "SOS_SCHEDULER_YIELD" => 1,
        "THREADPOOL" => 2,
        "RESOURCE_SEMAPHORE_QUERY_COMPILE" => 7,
        "LAZYWRITER_SLEEP" | "SERVER_IDLE_CHECK" | "LOGMGR_QUEUE" | "CHECKPOINT_QUEUE" => 11,
        "WRITELOG" | "LOGBUFFER" | "LOGMGR" | "LOGMGR_FLUSH" | "CHKPT" => 14,
        "ASYNC_NETWORK_IO" | "NET_WAITFOR_PACKET" | "EXTERNAL_SCRIPT_NETWORK_IO" => 15,
        "CXPACKET" | "CXCONSUMER" | "EXCHANGE" => 16,
        "RESOURCE_SEMAPHORE" | "CMEMTHREAD" | "MEMORY_ALLOCATION_EXT"
        | "RESERVED_MEMORY_ALLOCATION_EXT" => 17,
        "WAITFOR" | "WAIT_FOR_RESULTS" | "BROKER_RECEIVE_WAITFOR" => 18,
        "TRACEWRITE" | "SQLTRACE_BUFFER_FLUSH" | "SQLTRACE_WAIT_ENTRIES" => 19,
        "FT_RESTART_CRAWL" | "FT_IFTS_SCHEDULER_IDLE_WAIT" | "FULLTEXT GATHERER" => 20,
        "ASYNC_IO_COMPLETION" | "IO_COMPLETION" | "BACKUPIO" | "WRITE_COMPLETION" => 21,
        _ => return None,
    };
    Some(code)
}

fn has_any_prefix(s: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| s.starts_with(prefix))
}

/// Classify a wait type into `(code, category)`.
#[must_use]
pub fn classify(wait_type: &str) -> (u32, &'static str) {
    if let Some(code) = detailed_code(wait_type) {
        return (code, category_name(code));
    }

    let code = if wait_type.starts_with("LOCK_M_") {
        3
    } else if wait_type.starts_with("PAGELATCH_") {
        5
    } else if wait_type.starts_with("PAGEIOLATCH_") {
        6
    } else if wait_type.starts_with("LATCH_") {
        4
    } else if has_any_prefix(wait_type, &["CLR", "SQLCLR"]) {
        8
    } else if wait_type.starts_with("DBMIRROR") {
        9
    } else if has_any_prefix(wait_type, &["XACT", "DTC", "TRAN_MARKLATCH_", "MSQL_XACT_"]) {
        10
    } else if wait_type.starts_with("SLEEP_") {
        11
    } else if wait_type.starts_with("PREEMPTIVE_") {
        12
    } else if wait_type.starts_with("BROKER_") && wait_type != "BROKER_RECEIVE_WAITFOR" {
        13
    } else if has_any_prefix(wait_type, &["HT", "BMP", "BP"]) {
        16
    } else if has_any_prefix(wait_type, &["SE_REPL_", "REPL_", "PWAIT_HADR_"])
        || (wait_type.starts_with("HADR_") && wait_type != "HADR_THROTTLE_LOG_RATE_GOVERNOR")
    {
        22
    } else if wait_type.starts_with("RBIO_RG_") {
        23
    } else {
        0
    };

    (code, category_name(code))
}
