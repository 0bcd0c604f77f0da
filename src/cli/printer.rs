//! 结果打印器
//!
//! 提供表格和垂直格式的遍历结果输出

use crate::engine::TraversalStats;
use crate::types::Value;
use prettytable::{format, row, Cell, Row, Table};

/// 打印模式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrintMode {
    /// 表格模式
    Table,
    /// 垂直模式
    Vertical,
}

/// 结果打印器
pub struct Printer {
    mode: PrintMode,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new(PrintMode::Table)
    }
}

impl Printer {
    pub fn new(mode: PrintMode) -> Self {
        Self { mode }
    }

    /// 打印遍历结果
    ///
    /// 所有结果都是 map 时按键展开为列，否则输出单列 `value`
    pub fn print_result(&self, values: &[Value], stats: &TraversalStats) -> String {
        if values.is_empty() {
            return format!("Empty set ({} ms)\n", stats.execution_time_ms);
        }

        let (columns, rows) = tabulate(values);
        let output = match self.mode {
            PrintMode::Table => self.format_table(&columns, &rows),
            PrintMode::Vertical => self.format_vertical(&columns, &rows),
        };

        format!(
            "{}\n{} row(s) in set, {} step(s) ({} ms)\n",
            output,
            rows.len(),
            stats.steps_executed,
            stats.execution_time_ms
        )
    }

    /// 表格格式
    fn format_table(&self, columns: &[String], rows: &[Vec<String>]) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);

        let header: Vec<Cell> = columns.iter().map(|c| Cell::new(c)).collect();
        table.set_titles(Row::new(header));

        for row_data in rows {
            let cells: Vec<Cell> = row_data.iter().map(|v| Cell::new(v)).collect();
            table.add_row(Row::new(cells));
        }

        table.to_string()
    }

    /// 垂直格式
    fn format_vertical(&self, columns: &[String], rows: &[Vec<String>]) -> String {
        let max_col_width = columns.iter().map(|c| c.chars().count()).max().unwrap_or(0);
        let mut output = String::new();

        for (i, row_data) in rows.iter().enumerate() {
            output.push_str(&format!(
                "*************************** {}. row ***************************\n",
                i + 1
            ));

            for (j, col) in columns.iter().enumerate() {
                let value = row_data.get(j).map(|s| s.as_str()).unwrap_or("");
                output.push_str(&format!("{:>width$}: {}\n", col, value, width = max_col_width));
            }
        }

        output
    }

    /// 打印执行统计
    pub fn print_stats(&self, stats: &TraversalStats) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);
        table.set_titles(row!["Property", "Value"]);
        table.add_row(row!["Steps Executed", stats.steps_executed.to_string()]);
        table.add_row(row!["Traversers Returned", stats.traversers_returned.to_string()]);
        table.add_row(row!["Execution Time (ms)", stats.execution_time_ms.to_string()]);
        table.to_string()
    }
}

/// 将结果拆分为列名和字符串行
fn tabulate(values: &[Value]) -> (Vec<String>, Vec<Vec<String>>) {
    let all_maps = values.iter().all(|v| matches!(v, Value::Map(_)));
    if !all_maps {
        let rows = values.iter().map(|v| vec![v.to_string()]).collect();
        return (vec!["value".to_string()], rows);
    }

    let mut columns: Vec<String> = Vec::new();
    for value in values {
        if let Value::Map(entries) = value {
            for key in entries.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let rows = values
        .iter()
        .map(|value| match value {
            Value::Map(entries) => columns
                .iter()
                .map(|c| entries.get(c).map(|v| v.to_string()).unwrap_or_default())
                .collect(),
            other => vec![other.to_string()],
        })
        .collect();
    (columns, rows)
}
