//! 迷宫生成（-maze?）
//!
//! 迭代 DFS 在格点上开路，再把每个格子翻译成相对坐标的 fill 指令；建造范围
//! 用 tickingarea 圈住，指令分片下发避免冲垮客户端。

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::gateway::CommandDispatcher;

/// 单边最大格数（对应游戏内 160 格）
pub const MAX_CELLS_PER_AXIS: usize = 80;

const WALL_HEIGHT: i32 = 6;
const STEP: i32 = 2;
const START_OFFSET: i32 = 2;
/// 每发这么多条指令停 50ms
const COMMANDS_PER_SLICE: usize = 100;

#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    visited: bool,
    /// 通往 +x 邻居的墙已打通
    right: bool,
    /// 通往 +z 邻居的墙已打通
    down: bool,
}

/// DFS 开路：返回 size_x × size_z 的格子矩阵
fn carve(size_x: usize, size_z: usize, rng: &mut impl Rng) -> Vec<Vec<Cell>> {
    let mut maze = vec![vec![Cell::default(); size_z]; size_x];
    let (mut x, mut z) = (0usize, 0usize);
    let mut stack = vec![(x, z)];
    maze[x][z].visited = true;

    while !stack.is_empty() {
        let mut neighbors = Vec::with_capacity(4);
        if x + 1 < size_x && !maze[x + 1][z].visited {
            neighbors.push("right");
        }
        if x > 0 && !maze[x - 1][z].visited {
            neighbors.push("left");
        }
        if z > 0 && !maze[x][z - 1].visited {
            neighbors.push("up");
        }
        if z + 1 < size_z && !maze[x][z + 1].visited {
            neighbors.push("down");
        }

        if let Some(next) = neighbors.choose(rng) {
            stack.push((x, z));
            match *next {
                "up" => {
                    z -= 1;
                    maze[x][z].down = true;
                }
                "down" => {
                    maze[x][z].down = true;
                    z += 1;
                }
                "right" => {
                    maze[x][z].right = true;
                    x += 1;
                }
                _ => {
                    x -= 1;
                    maze[x][z].right = true;
                }
            }
            maze[x][z].visited = true;
        } else if let Some((px, pz)) = stack.pop() {
            x = px;
            z = pz;
        }
    }
    maze
}

/// 把格子矩阵翻译成 fill 指令序列（不含 tickingarea 首尾）
fn build_commands(maze: &[Vec<Cell>], wall_block: &str) -> Vec<String> {
    let size_x = maze.len();
    let size_z = maze[0].len();
    let goal = (size_x - 1, size_z - 1);
    let mut commands = Vec::new();

    for (i, row) in maze.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            let cx = i as i32 * STEP + START_OFFSET;
            let cz = j as i32 * STEP + START_OFFSET;

            let floor = if (i, j) == goal { "gold_block" } else { "stone" };
            commands.push(format!(
                "fill ~{cx} ~-1 ~{cz} ~{} ~-1 ~{} {floor}",
                cx + 1,
                cz + 1
            ));
            commands.push(format!(
                "fill ~{} ~ ~{} ~{} ~{} ~{} {wall_block}",
                cx + 1,
                cz + 1,
                cx + 1,
                WALL_HEIGHT - 1,
                cz + 1
            ));
            commands.push(format!(
                "fill ~{cx} ~ ~{cz} ~{cx} ~{} ~{cz} air",
                WALL_HEIGHT - 1
            ));

            let right = if cell.right { "air" } else { wall_block };
            commands.push(format!(
                "fill ~{} ~ ~{cz} ~{} ~{} ~{cz} {right}",
                cx + 1,
                cx + 1,
                WALL_HEIGHT - 1
            ));
            let down = if cell.down { "air" } else { wall_block };
            commands.push(format!(
                "fill ~{cx} ~ ~{} ~{cx} ~{} ~{} {down}",
                cz + 1,
                WALL_HEIGHT - 1,
                cz + 1
            ));
        }
    }

    // 外围两面封墙
    let max_x = size_x as i32 * STEP + START_OFFSET;
    let max_z = size_z as i32 * STEP + START_OFFSET;
    commands.push(format!(
        "fill ~{b} ~ ~{b} ~{max_x} ~{} ~{b} {wall_block}",
        WALL_HEIGHT - 1,
        b = START_OFFSET - 1
    ));
    commands.push(format!(
        "fill ~{b} ~ ~{b} ~{b} ~{} ~{max_z} {wall_block}",
        WALL_HEIGHT - 1,
        b = START_OFFSET - 1
    ));
    commands
}

/// 迷宫建造器
pub struct MazeBuilder {
    dispatcher: Arc<CommandDispatcher>,
}

impl MazeBuilder {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// 在指令发起者脚下生成 size_x × size_z 格的迷宫
    pub async fn build(&self, size_x: usize, size_z: usize, wall_block: &str) {
        let size_x = size_x.clamp(1, MAX_CELLS_PER_AXIS);
        let size_z = size_z.clamp(1, MAX_CELLS_PER_AXIS);

        let max_x = size_x as i32 * STEP + START_OFFSET;
        let max_z = size_z as i32 * STEP + START_OFFSET;
        self.dispatcher.run_command("tickingarea remove maze_area").await;
        self.dispatcher
            .run_command(&format!(
                "tickingarea add ~ ~-1 ~ ~{max_x} ~{WALL_HEIGHT} ~{max_z} maze_area"
            ))
            .await;

        let maze = carve(size_x, size_z, &mut rand::thread_rng());
        let commands = build_commands(&maze, wall_block);

        self.dispatcher
            .send_chat(&format!(
                "§e[迷宮] 正在生成{}x{}的迷宮...",
                size_x * 2,
                size_z * 2
            ))
            .await;

        for (count, command) in commands.iter().enumerate() {
            self.dispatcher.run_command(command).await;
            if (count + 1) % COMMANDS_PER_SLICE == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }

        self.dispatcher.send_chat("§g[迷宮] 迷宮生成完成！").await;
        self.dispatcher.run_command("tickingarea remove maze_area").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn carve_visits_every_cell() {
        let mut rng = StdRng::seed_from_u64(7);
        let maze = carve(12, 9, &mut rng);
        assert!(maze.iter().flatten().all(|c| c.visited));
    }

    #[test]
    fn carved_maze_is_fully_connected() {
        let mut rng = StdRng::seed_from_u64(42);
        let (sx, sz) = (10usize, 10usize);
        let maze = carve(sx, sz, &mut rng);

        // 沿打通的墙做洪水填充，必须到达所有格子
        let mut seen = vec![vec![false; sz]; sx];
        let mut stack = vec![(0usize, 0usize)];
        seen[0][0] = true;
        let mut count = 1;
        // 邻接判断：right 打通 x<->x+1，down 打通 z<->z+1
        while let Some((x, z)) = stack.pop() {
            if x + 1 < sx && maze[x][z].right && !seen[x + 1][z] {
                seen[x + 1][z] = true;
                count += 1;
                stack.push((x + 1, z));
            }
            if x > 0 && maze[x - 1][z].right && !seen[x - 1][z] {
                seen[x - 1][z] = true;
                count += 1;
                stack.push((x - 1, z));
            }
            if z + 1 < sz && maze[x][z].down && !seen[x][z + 1] {
                seen[x][z + 1] = true;
                count += 1;
                stack.push((x, z + 1));
            }
            if z > 0 && maze[x][z - 1].down && !seen[x][z - 1] {
                seen[x][z - 1] = true;
                count += 1;
                stack.push((x, z - 1));
            }
        }
        assert_eq!(count, sx * sz);
    }

    #[test]
    fn build_commands_covers_all_cells_plus_borders() {
        let mut rng = StdRng::seed_from_u64(1);
        let maze = carve(4, 3, &mut rng);
        let commands = build_commands(&maze, "stone");
        // 每格 5 条 fill + 2 条外围封墙
        assert_eq!(commands.len(), 4 * 3 * 5 + 2);
        assert!(commands.iter().all(|c| c.starts_with("fill ")));
        // 终点格必须铺金块
        assert!(commands.iter().any(|c| c.contains("gold_block")));
    }
}
