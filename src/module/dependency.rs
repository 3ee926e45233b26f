//! 模块依赖管理
//!
//! [`DependencyGraph`] 记录包之间的依赖关系，并用 Kahn 算法给出安装顺序。
//! 整个过程是迭代的，循环依赖以 `CircularDependency` 报告。
//!
//! 节点按加入顺序保存，同一批可安装的节点按加入顺序输出，
//! 因此相同的输入总是得到相同的安装顺序。
//!
//! # 示例
//!
//! ```rust
//! use lotgd_core::module::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_dependency("lotgd/village", "lotgd/core-data");
//! graph.add_dependency("lotgd/forest", "lotgd/core-data");
//!
//! let order = graph.topological_sort().unwrap();
//! assert_eq!(order, vec!["lotgd/core-data", "lotgd/village", "lotgd/forest"]);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use crate::package::PackageProvider;
use crate::utils::{CoreError, Result};

/// 依赖关系图
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点（加入顺序）
    nodes: Vec<String>,
    /// 正向边：节点 -> 它依赖的节点
    edges: HashMap<String, Vec<String>>,
    /// 反向边：节点 -> 依赖它的节点
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// 创建空图
    pub fn new() -> Self {
        Self::default()
    }

    /// 从包索引构建若干根包的依赖闭包
    ///
    /// - 索引中不存在的依赖作为无依赖的叶子节点加入，由调用方判定失败
    /// - 不属于 `module_kind` 的依赖包不加入图中
    pub fn closure<'a, P, I>(provider: &P, roots: I, module_kind: &str) -> Self
    where
        P: PackageProvider + ?Sized,
        I: IntoIterator<Item = &'a str>,
    {
        let mut graph = Self::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for root in roots {
            if graph.add_node(root) {
                queue.push_back(root.to_string());
            }
        }

        while let Some(name) = queue.pop_front() {
            let Some(package) = provider.package(&name) else {
                continue;
            };

            for (dependency, _) in package.dependencies() {
                let is_foreign = provider
                    .package(dependency)
                    .map(|p| !p.is_kind(module_kind))
                    .unwrap_or(false);
                if is_foreign {
                    continue;
                }

                if !graph.contains(dependency) {
                    queue.push_back(dependency.to_string());
                }
                graph.add_dependency(&name, dependency);
            }
        }

        graph
    }

    /// 添加节点，返回是否为新节点
    pub fn add_node(&mut self, id: &str) -> bool {
        if self.edges.contains_key(id) {
            return false;
        }
        self.nodes.push(id.to_string());
        self.edges.insert(id.to_string(), Vec::new());
        self.reverse_edges.insert(id.to_string(), Vec::new());
        true
    }

    /// 添加依赖关系：`id` 依赖 `dependency`
    ///
    /// 不存在的节点会自动加入，重复的边会被忽略。
    pub fn add_dependency(&mut self, id: &str, dependency: &str) {
        self.add_node(id);
        self.add_node(dependency);

        if let Some(deps) = self.edges.get_mut(id) {
            if !deps.iter().any(|d| d == dependency) {
                deps.push(dependency.to_string());
            }
        }
        if let Some(dependents) = self.reverse_edges.get_mut(dependency) {
            if !dependents.iter().any(|d| d == id) {
                dependents.push(id.to_string());
            }
        }
    }

    /// 是否包含节点
    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// 全部节点（加入顺序）
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// 直接依赖
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// 直接依赖方
    pub fn dependents(&self, id: &str) -> &[String] {
        self.reverse_edges.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kahn 排序，返回 (已排序节点, 留在环上或依赖环的节点)
    fn kahn(&self) -> (Vec<String>, Vec<String>) {
        let mut remaining: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.dependencies(n).len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|n| remaining.get(n) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            for dependent in self.dependents(node) {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        let sorted: HashSet<&str> = order.iter().map(String::as_str).collect();
        let unsorted = self
            .nodes
            .iter()
            .filter(|n| !sorted.contains(n.as_str()))
            .cloned()
            .collect();
        (order, unsorted)
    }

    /// 部分拓扑排序
    ///
    /// 返回 (可以安装的节点, 处在环上或依赖环的节点)，前者依赖总在依赖方之前。
    pub fn partial_sort(&self) -> (Vec<String>, Vec<String>) {
        self.kahn()
    }

    /// 拓扑排序，依赖总在依赖方之前
    ///
    /// # Errors
    ///
    /// 存在循环依赖时返回 `CircularDependency`，消息中包含环路径
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let (order, unsorted) = self.kahn();
        if unsorted.is_empty() {
            return Ok(order);
        }

        let cycle = self.cycle_within(&unsorted).unwrap_or(unsorted);
        Err(CoreError::CircularDependency(cycle.join(" -> ")))
    }

    /// 查找一条循环依赖路径，首尾节点相同
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let (_, unsorted) = self.kahn();
        if unsorted.is_empty() {
            None
        } else {
            self.cycle_within(&unsorted)
        }
    }

    /// 在 Kahn 排序剩下的节点中沿依赖边行走，直到回到走过的节点
    fn cycle_within(&self, unsorted: &[String]) -> Option<Vec<String>> {
        let candidates: HashSet<&str> = unsorted.iter().map(String::as_str).collect();
        let mut current = unsorted.first()?.as_str();
        let mut path: Vec<&str> = Vec::new();
        let mut visited: HashMap<&str, usize> = HashMap::new();

        loop {
            if let Some(&start) = visited.get(current) {
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(current.to_string());
                return Some(cycle);
            }
            visited.insert(current, path.len());
            path.push(current);

            // 剩下的节点至少还有一个依赖也在剩下的节点中
            current = self
                .dependencies(current)
                .iter()
                .map(String::as_str)
                .find(|d| candidates.contains(d))?;
        }
    }
}
