use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows, ""));
}

/// Left-aligned columns separated by two spaces, each line prefixed by `indent`.
pub fn render_table(headers: &[&str], rows: &[Vec<String>], indent: &str) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:w$}"))
            .collect();
        format!("{indent}{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(headers.to_vec());
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&line(sep.iter().map(String::as_str).collect()));
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_to_widest_cell() {
        let rows = vec![
            vec!["VpcABCD".to_string(), "AWS::EC2::VPC".to_string()],
            vec!["EcsTaskAClusterXYZ".to_string(), "AWS::ECS::Cluster".to_string()],
        ];
        let out = render_table(&["LOGICAL ID", "TYPE"], &rows, "  ");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "  LOGICAL ID          TYPE");
        assert_eq!(lines[1], "  ------------------  -----------------");
        assert_eq!(lines[2], "  VpcABCD             AWS::EC2::VPC");
    }
}
