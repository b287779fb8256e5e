//! T-SQL templates and parameter splicing.
//!
//! Templates carry a `{filter_instance_name}` hole where the optional
//! `@@SERVERNAME` predicate lands. Templates that assemble dynamic SQL via
//! `sp_executesql` need the predicate's quotes doubled; the two helpers
//! below cover both cases. Edition and version branching happens inside
//! the T-SQL itself: unsupported editions surface a server-side
//! `RAISERROR`, which the adapter reports as a hard query failure.

use crate::kind::{QueryKind, SampleParams};

const FILTER_HOLE: &str = "{filter_instance_name}";
const MAX_SAMPLE_HOLE: &str = "{max_sample_count}";
const LOOKBACK_HOLE: &str = "{lookback_seconds}";

const DATABASE_IO_QUERY: &str = r#"
SET DEADLOCK_PRIORITY -10;
IF SERVERPROPERTY('EngineEdition') NOT IN (2,3,4) BEGIN /*NOT IN Standard,Enterprise,Express*/
	DECLARE @ErrorMessage AS nvarchar(500) = 'Connection string Server:'+ @@ServerName + ',Database:' + DB_NAME() +' is not a SQL Server Standard,Enterprise or Express. This query is only supported on these editions.';
	RAISERROR (@ErrorMessage,11,1)
	RETURN
END

DECLARE
	 @SqlStatement AS nvarchar(max)
	,@MajorMinorVersion AS int = CAST(PARSENAME(CAST(SERVERPROPERTY('ProductVersion') AS nvarchar),4) AS int) * 100 + CAST(PARSENAME(CAST(SERVERPROPERTY('ProductVersion') AS nvarchar),3) AS int)
	,@Columns AS nvarchar(max) = ''
IF @MajorMinorVersion > 1100 BEGIN
	SET @Columns += N'
	,vfs.[io_stall_queued_read_ms] AS [rg_read_stall_ms]
	,vfs.[io_stall_queued_write_ms] AS [rg_write_stall_ms]'
END

SET @SqlStatement = N'
SELECT
	''sqlserver_database_io'' AS [measurement]
	,REPLACE(@@SERVERNAME,''\'','':'') AS [sql_instance]
	,HOST_NAME() AS [computer_name]
	,DB_NAME(vfs.[database_id]) AS [database_name]
	,COALESCE(mf.[physical_name],''RBPEX'') AS [physical_filename]	--RPBEX = Resilient Buffer Pool Extension
	,COALESCE(mf.[name],''RBPEX'') AS [logical_filename]	--RPBEX = Resilient Buffer Pool Extension
	,mf.[type_desc] AS [file_type]
	,vfs.[io_stall_read_ms] AS [read_latency_ms]
	,vfs.[num_of_reads] AS [reads]
	,vfs.[num_of_bytes_read] AS [read_bytes]
	,vfs.[io_stall_write_ms] AS [write_latency_ms]
	,vfs.[num_of_writes] AS [writes]
	,vfs.[num_of_bytes_written] AS [write_bytes]'
	+ @Columns + N'
FROM sys.dm_io_virtual_file_stats(NULL, NULL) AS vfs
INNER JOIN sys.master_files AS mf WITH (NOLOCK)
	ON vfs.[database_id] = mf.[database_id] AND vfs.[file_id] = mf.[file_id]
{filter_instance_name}'

EXEC sp_executesql @SqlStatement
"#;

const PERF_COUNTERS_QUERY: &str = r#"
SET DEADLOCK_PRIORITY -10;
IF SERVERPROPERTY('EngineEdition') NOT IN (2,3,4) BEGIN /*NOT IN Standard,Enterprise,Express*/
	DECLARE @ErrorMessage AS nvarchar(500) = 'Connection string Server:'+ @@ServerName + ',Database:' + DB_NAME() +' is not a SQL Server Standard, Enterprise or Express. This query is only supported on these editions.';
	RAISERROR (@ErrorMessage,11,1)
	RETURN
END

DECLARE @PCounters TABLE
(
	 [object_name] nvarchar(128)
	,[counter_name] nvarchar(128)
	,[instance_name] nvarchar(128)
	,[cntr_value] bigint
	,[cntr_type] int
	PRIMARY KEY([object_name], [counter_name], [instance_name])
);

WITH PerfCounters AS (
SELECT DISTINCT
	 RTRIM(spi.[object_name]) [object_name]
	,RTRIM(spi.[counter_name]) [counter_name]
	,RTRIM(spi.[instance_name]) AS [instance_name]
	,CAST(spi.[cntr_value] AS bigint) AS [cntr_value]
	,spi.[cntr_type]
	FROM sys.dm_os_performance_counters AS spi
	WHERE
		counter_name IN (
			 'SQL Compilations/sec'
			,'SQL Re-Compilations/sec'
			,'User Connections'
			,'Batch Requests/sec'
			,'Logouts/sec'
			,'Logins/sec'
			,'Processes blocked'
			,'Latch Waits/sec'
			,'Average Latch Wait Time (ms)'
			,'Full Scans/sec'
			,'Index Searches/sec'
			,'Page Splits/sec'
			,'Page lookups/sec'
			,'Page reads/sec'
			,'Page writes/sec'
			,'Readahead pages/sec'
			,'Lazy writes/sec'
			,'Checkpoint pages/sec'
			,'Table Lock Escalations/sec'
			,'Page life expectancy'
			,'Log File(s) Size (KB)'
			,'Log File(s) Used Size (KB)'
			,'Data File(s) Size (KB)'
			,'Transactions/sec'
			,'Write Transactions/sec'
			,'Active Transactions'
			,'Log Growths'
			,'Active Temp Tables'
			,'Logical Connections'
			,'Temp Tables Creation Rate'
			,'Temp Tables For Destruction'
			,'Free Space in tempdb (KB)'
			,'Version Store Size (KB)'
			,'Memory Grants Pending'
			,'Memory Grants Outstanding'
			,'Free list stalls/sec'
			,'Buffer cache hit ratio'
			,'Buffer cache hit ratio base'
			,'Database Pages'
			,'Backup/Restore Throughput/sec'
			,'Total Server Memory (KB)'
			,'Target Server Memory (KB)'
			,'Log Flushes/sec'
			,'Log Flush Wait Time'
			,'Memory broker clerk size'
			,'Log Bytes Flushed/sec'
			,'Bytes Sent to Replica/sec'
			,'Log Send Queue'
			,'Bytes Sent to Transport/sec'
			,'Sends to Replica/sec'
			,'Sends to Transport/sec'
			,'Bytes Received from Replica/sec'
			,'Receives from Replica/sec'
			,'Flow Control Time (ms/sec)'
			,'Flow Control/sec'
			,'Resent Messages/sec'
			,'Redone Bytes/sec'
			,'XTP Memory Used (KB)'
			,'Transaction Delay'
			,'Log Bytes Received/sec'
			,'Log Apply Pending Queue'
			,'Recovery Queue'
			,'Log Apply Ready Queue'
			,'CPU usage %'
			,'CPU usage % base'
			,'Queued requests'
			,'Requests completed/sec'
			,'Blocked tasks'
			,'Active memory grant amount (KB)'
			,'Disk Read Bytes/sec'
			,'Disk Read IO Throttled/sec'
			,'Disk Read IO/sec'
			,'Disk Write Bytes/sec'
			,'Disk Write IO Throttled/sec'
			,'Disk Write IO/sec'
			,'Used memory (KB)'
			,'Forwarded Records/sec'
			,'Background Writer pages/sec'
			,'Percent Log Used'
			,'Log Send Queue KB'
			,'Redo Queue KB'
			,'Mirrored Write Transactions/sec'
			,'Group Commit Time'
			,'Group Commits/Sec'
			,'Workfiles Created/sec'
			,'Worktables Created/sec'
			,'Distributed Query'
			,'DTC calls'
			,'Query Store CPU usage'
			,'Query Store physical reads'
			,'Query Store logical reads'
			,'Query Store logical writes'
		) OR (
			spi.[object_name] LIKE '%User Settable%'
			OR spi.[object_name] LIKE '%SQL Errors%'
			OR spi.[object_name] LIKE '%Batch Resp Statistics%'
		) OR (
			spi.[instance_name] IN ('_Total')
			AND spi.[counter_name] IN (
				 'Lock Timeouts/sec'
				,'Lock Timeouts (timeout > 0)/sec'
				,'Number of Deadlocks/sec'
				,'Lock Waits/sec'
				,'Latch Waits/sec'
			)
		)
)

INSERT INTO @PCounters SELECT * FROM PerfCounters;

SELECT
	 'sqlserver_performance' AS [measurement]
	,REPLACE(@@SERVERNAME,'\',':') AS [sql_instance]
	,HOST_NAME() AS [computer_name]
	,pc.[object_name] AS [object]
	,pc.[counter_name] AS [counter]
	,CASE pc.[instance_name] WHEN '_Total' THEN 'Total' ELSE ISNULL(pc.[instance_name],'') END AS [instance]
	,CAST(CASE WHEN pc.[cntr_type] = 537003264 AND pc1.[cntr_value] > 0 THEN (pc.[cntr_value] * 1.0) / (pc1.[cntr_value] * 1.0) * 100 ELSE pc.[cntr_value] END AS float(10)) AS [value]
	,CAST(pc.[cntr_type] AS varchar(25)) AS [counter_type]
FROM @PCounters AS pc
LEFT OUTER JOIN @PCounters AS pc1
	ON (
		pc.[counter_name] = REPLACE(pc1.[counter_name],' base','')
		OR pc.[counter_name] = REPLACE(pc1.[counter_name],' base',' (ms)')
	)
	AND pc.[object_name] = pc1.[object_name]
	AND pc.[instance_name] = pc1.[instance_name]
	AND pc1.[counter_name] LIKE '%base'
WHERE
	pc.[counter_name] NOT LIKE '% base'
{filter_instance_name}
OPTION(RECOMPILE)
"#;

const SERVER_PROPERTIES_QUERY: &str = r#"
SET DEADLOCK_PRIORITY -10;
IF SERVERPROPERTY('EngineEdition') NOT IN (2,3,4) BEGIN /*NOT IN Standard, Enterprise, Express*/
	DECLARE @ErrorMessage AS nvarchar(500) = 'Connection string Server:'+ @@ServerName + ',Database:' + DB_NAME() +' is not a SQL Server Standard, Enterprise or Express. This query is only supported on these editions.';
	RAISERROR (@ErrorMessage,11,1)
	RETURN
END

DECLARE
	 @SqlStatement AS nvarchar(max) = ''
	,@Columns AS nvarchar(MAX) = ''

IF CAST(SERVERPROPERTY('ProductVersion') AS varchar(50)) >= '10.50.2500.0'
	SET @Columns = N'
	,CASE [virtual_machine_type_desc]
		WHEN ''NONE'' THEN ''PHYSICAL Machine''
		ELSE [virtual_machine_type_desc]
	END AS [hardware_type]'

SET @SqlStatement = '
DECLARE @ForceEncryption INT
DECLARE @DynamicportNo NVARCHAR(50);
DECLARE @StaticportNo NVARCHAR(50);

EXEC [xp_instance_regread]
	 @rootkey = ''HKEY_LOCAL_MACHINE''
	,@key = ''SOFTWARE\Microsoft\Microsoft SQL Server\MSSQLServer\SuperSocketNetLib''
	,@value_name = ''ForceEncryption''
	,@value = @ForceEncryption OUTPUT;

EXEC [xp_instance_regread]
	 @rootkey = ''HKEY_LOCAL_MACHINE''
	,@key = ''Software\Microsoft\Microsoft SQL Server\MSSQLServer\SuperSocketNetLib\Tcp\IpAll''
	,@value_name = ''TcpDynamicPorts''
	,@value = @DynamicportNo OUTPUT

EXEC [xp_instance_regread]
	  @rootkey = ''HKEY_LOCAL_MACHINE''
     ,@key = ''Software\Microsoft\Microsoft SQL Server\MSSQLServer\SuperSocketNetLib\Tcp\IpAll''
     ,@value_name = ''TcpPort''
     ,@value = @StaticportNo OUTPUT

SELECT
	 ''sqlserver_server_properties'' AS [measurement]
	,REPLACE(@@SERVERNAME,''\'','':'') AS [sql_instance]
	,HOST_NAME() AS [computer_name]
	,@@SERVICENAME AS [service_name]
	,si.[cpu_count]
	,(SELECT [total_physical_memory_kb] FROM sys.[dm_os_sys_memory]) AS [server_memory]
	,(SELECT [available_physical_memory_kb] FROM sys.[dm_os_sys_memory]) AS [available_server_memory]
	,SERVERPROPERTY(''Edition'') AS [sku]
	,CAST(SERVERPROPERTY(''EngineEdition'') AS int) AS [engine_edition]
	,DATEDIFF(MINUTE,si.[sqlserver_start_time],GETDATE()) AS [uptime]
	,SERVERPROPERTY(''ProductVersion'') AS [sql_version]
	,SERVERPROPERTY(''IsClustered'') AS [instance_type]
	,SERVERPROPERTY(''IsHadrEnabled'') AS [is_hadr_enabled]
	,LEFT(@@VERSION,CHARINDEX('' - '',@@VERSION)) AS [sql_version_desc]
	,@ForceEncryption AS [ForceEncryption]
	,COALESCE(@DynamicportNo,@StaticportNo) AS [Port]
	,IIF(@DynamicportNo IS NULL, ''Static'', ''Dynamic'') AS [PortType]
	,dbs.[db_online]
	,dbs.[db_restoring]
	,dbs.[db_recovering]
	,dbs.[db_recoveryPending]
	,dbs.[db_suspect]
	,dbs.[db_offline]'
	+ @Columns + N'
	FROM sys.[dm_os_sys_info] AS si
	CROSS APPLY (
		SELECT
			 SUM(CASE WHEN [state] = 0 THEN 1 ELSE 0 END) AS [db_online]
			,SUM(CASE WHEN [state] = 1 THEN 1 ELSE 0 END) AS [db_restoring]
			,SUM(CASE WHEN [state] = 2 THEN 1 ELSE 0 END) AS [db_recovering]
			,SUM(CASE WHEN [state] = 3 THEN 1 ELSE 0 END) AS [db_recoveryPending]
			,SUM(CASE WHEN [state] = 4 THEN 1 ELSE 0 END) AS [db_suspect]
			,SUM(CASE WHEN [state] IN (6,10) THEN 1 ELSE 0 END) AS [db_offline]
		FROM sys.databases
	) AS dbs
{filter_instance_name}'

EXEC sp_executesql @SqlStatement
"#;

const QUERY_STATS_PROJECTION: &str = r#"SELECT TOP ({max_sample_count})
	 REPLACE(@@SERVERNAME,'\',':') AS [sql_instance]
	,HOST_NAME() AS [computer_name]
	,qs.[query_hash] AS [query_hash]
	,qs.[query_plan_hash] AS [query_plan_hash]
	,SUM(qs.[total_elapsed_time]) AS [total_elapsed_time]
	,SUM(qs.[total_rows]) AS [total_rows]
	,SUM(qs.[total_logical_reads]) AS [total_logical_reads]
	,SUM(qs.[total_logical_writes]) AS [total_logical_writes]
	,SUM(qs.[total_physical_reads]) AS [total_physical_reads]
	,SUM(qs.[execution_count]) AS [execution_count]
	,SUM(qs.[total_worker_time]) AS [total_worker_time]
	,SUM(qs.[total_grant_kb]) AS [total_grant_kb]
	,MAX(qs.[plan_handle]) AS [plan_handle]"#;

const QUERY_STATS_BASE: &str = r#"FROM sys.dm_exec_query_stats AS qs WITH (NOLOCK)
WHERE qs.[last_execution_time] > DATEADD(SECOND, -{lookback_seconds}, SYSDATETIME())
{filter_instance_name}
GROUP BY qs.[query_hash], qs.[query_plan_hash]
ORDER BY SUM(qs.[total_elapsed_time]) DESC
OPTION(RECOMPILE)"#;

const QUERY_SAMPLES_QUERY: &str = r#"
SET DEADLOCK_PRIORITY -10;
SELECT TOP ({max_sample_count})
	 DB_NAME(sess.[database_id]) AS [db_name]
	,ISNULL(c.[client_net_address], '') AS [client_address]
	,ISNULL(c.[client_tcp_port], '') AS [client_port]
	,CONVERT(NVARCHAR, TODATETIMEOFFSET(req.[start_time], DATEPART(TZOFFSET, SYSDATETIMEOFFSET())), 126) AS [query_start]
	,sess.[session_id] AS [session_id]
	,sess.[status] AS [session_status]
	,ISNULL(sess.[host_name], '') AS [host_name]
	,req.[command] AS [command]
	,SUBSTRING(qt.[text], (req.[statement_start_offset] / 2) + 1,
		((CASE req.[statement_end_offset]
			WHEN -1 THEN DATALENGTH(qt.[text])
			ELSE req.[statement_end_offset]
		END - req.[statement_start_offset]) / 2) + 1) AS [statement_text]
	,req.[blocking_session_id] AS [blocking_session_id]
	,ISNULL(req.[wait_type], '') AS [wait_type]
	,req.[wait_time] AS [wait_time]
	,ISNULL(req.[wait_resource], '') AS [wait_resource]
	,req.[open_transaction_count] AS [open_transaction_count]
	,req.[transaction_id] AS [transaction_id]
	,req.[percent_complete] AS [percent_complete]
	,req.[estimated_completion_time] AS [estimated_completion_time]
	,req.[cpu_time] AS [cpu_time]
	,req.[total_elapsed_time] AS [total_elapsed_time]
	,req.[reads] AS [reads]
	,req.[writes] AS [writes]
	,req.[logical_reads] AS [logical_reads]
	,req.[transaction_isolation_level] AS [transaction_isolation_level]
	,ISNULL(req.[lock_timeout], '') AS [lock_timeout]
	,ISNULL(req.[deadlock_priority], '') AS [deadlock_priority]
	,req.[row_count] AS [row_count]
	,req.[query_hash] AS [query_hash]
	,req.[query_plan_hash] AS [query_plan_hash]
	,ISNULL(req.[context_info], 0x) AS [context_info]
	,sess.[login_name] AS [user_name]
	,sess.[login_name] AS [login_name]
	,sess.[original_login_name] AS [original_login_name]
	,ISNULL(OBJECT_NAME(qt.[objectid], qt.[dbid]), '') AS [object_name]
FROM sys.dm_exec_sessions AS sess
INNER JOIN sys.dm_exec_connections AS c
	ON sess.[session_id] = c.[session_id]
INNER JOIN sys.dm_exec_requests AS req
	ON c.[connection_id] = req.[connection_id]
CROSS APPLY sys.dm_exec_sql_text(req.[sql_handle]) AS qt
WHERE sess.[status] != 'sleeping'
{filter_instance_name}
"#;

/// Predicate for templates that splice it into dynamic SQL, where single
/// quotes must be doubled.
fn dynamic_instance_filter(instance_name: Option<&str>) -> String {
    match instance_name {
        Some(name) => format!("WHERE @@SERVERNAME = ''{name}''"),
        None => String::new(),
    }
}

/// Predicate for templates that append it to a plain `WHERE` clause.
fn direct_instance_filter(instance_name: Option<&str>) -> String {
    match instance_name {
        Some(name) => format!("\tAND @@SERVERNAME = '{name}'"),
        None => String::new(),
    }
}

fn fill_sample_holes(template: &str, params: &SampleParams) -> String {
    template
        .replace(MAX_SAMPLE_HOLE, &params.max_sample_count.to_string())
        .replace(LOOKBACK_HOLE, &params.lookback_seconds.to_string())
}

fn query_stats_query(
    instance_name: Option<&str>,
    params: &SampleParams,
    with_text_and_plan: bool,
) -> String {
    let mut query = String::from("\nSET DEADLOCK_PRIORITY -10;\nWITH qstats AS (\n");
    query.push_str(QUERY_STATS_PROJECTION);
    query.push('\n');
    query.push_str(QUERY_STATS_BASE);
    query.push_str("\n)\nSELECT qstats.*");
    if with_text_and_plan {
        query.push_str(
            r#"
	,SUBSTRING(qt.[text], 1, 4000) AS [text]
	,qp.[query_plan] AS [query_plan]
FROM qstats
CROSS APPLY sys.dm_exec_sql_text(qstats.[plan_handle]) AS qt
CROSS APPLY sys.dm_exec_query_plan(qstats.[plan_handle]) AS qp
"#,
        );
    } else {
        query.push_str("\nFROM qstats\n");
    }
    fill_sample_holes(&query, params).replace(FILTER_HOLE, &direct_instance_filter(instance_name))
}

/// Resolve the final T-SQL text for a query kind.
///
/// Pure and deterministic: equal kinds (including parameters) produce
/// byte-identical text.
#[must_use]
pub fn query_for(kind: &QueryKind) -> String {
    match kind {
        QueryKind::DatabaseIo { instance_name } => DATABASE_IO_QUERY.replace(
            FILTER_HOLE,
            &dynamic_instance_filter(instance_name.as_deref()),
        ),
        QueryKind::PerfCounters { instance_name } => PERF_COUNTERS_QUERY.replace(
            FILTER_HOLE,
            &direct_instance_filter(instance_name.as_deref()),
        ),
        QueryKind::ServerProperties { instance_name } => SERVER_PROPERTIES_QUERY.replace(
            FILTER_HOLE,
            &dynamic_instance_filter(instance_name.as_deref()),
        ),
        QueryKind::QueryMetrics {
            instance_name,
            params,
        } => query_stats_query(instance_name.as_deref(), params, false),
        QueryKind::QueryTextAndPlan {
            instance_name,
            params,
        } => query_stats_query(instance_name.as_deref(), params, true),
        QueryKind::QuerySamples {
            instance_name,
            params,
        } => fill_sample_holes(QUERY_SAMPLES_QUERY, params).replace(
            FILTER_HOLE,
            &direct_instance_filter(instance_name.as_deref()),
        ),
    }
}
